//! # Device Model
//!
//! Everything a scan cycle produces, from the raw discovery observation
//! ([`DeviceCandidate`]) to the snapshot published to readers ([`ScanSnapshot`]).
//!
//! None of these types carry identity across cycles: a fresh snapshot is built
//! every time and replaces the previous one as a whole.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A speaker announced over mDNS that passed the model filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCandidate {
    /// Friendly name (TXT `fn`).
    pub name: String,
    pub address: IpAddr,
    /// Vendor assigned UUID (TXT `id`). May be empty on misbehaving devices.
    pub identifier: String,
    /// Advertised model string (TXT `md`).
    pub model: String,
}

/// Outcome of one network probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub label: String,
    pub elapsed_ms: f64,
    /// Empty on success.
    pub error: String,
}

impl ProbeResult {
    pub fn success(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
            error: String::new(),
        }
    }

    pub fn failure(label: impl Into<String>, elapsed_ms: f64, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Aggregated health of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub healthy: bool,
    pub worst_response_ms: f64,
    pub probes: Vec<ProbeResult>,
    /// Empty when healthy, and also when the device is merely slow.
    pub error: String,
}

/// Externally observable state of one speaker for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub identifier: String,
    pub name: String,
    pub address: IpAddr,
    pub model: String,
    pub healthy: bool,
    pub worst_response_ms: f64,
    pub probes: Vec<ProbeResult>,
    pub error: String,
}

impl DeviceRecord {
    pub fn merge(candidate: DeviceCandidate, verdict: HealthVerdict) -> Self {
        Self {
            identifier: candidate.identifier,
            name: candidate.name,
            address: candidate.address,
            model: candidate.model,
            healthy: verdict.healthy,
            worst_response_ms: verdict.worst_response_ms,
            probes: verdict.probes,
            error: verdict.error,
        }
    }
}

/// All device records produced by one completed scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub devices: BTreeMap<String, DeviceRecord>,
    pub completed_at: DateTime<Utc>,
}

impl ScanSnapshot {
    /// Keys records by identifier. Later records win on duplicate identifiers.
    pub fn from_records(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        let devices: BTreeMap<String, DeviceRecord> = records
            .into_iter()
            .map(|record| (record.identifier.clone(), record))
            .collect();
        Self {
            devices,
            completed_at: Utc::now(),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&DeviceRecord> {
        self.devices.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.devices.values().filter(|d| d.healthy).count()
    }

    pub fn frozen(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values().filter(|d| !d.healthy)
    }
}
