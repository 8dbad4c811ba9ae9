use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_THRESHOLD_MS: u64 = 1_000;
pub const DEFAULT_BROWSE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 3_000;

pub const SCAN_INTERVAL_RANGE: RangeInclusive<u64> = 60..=3_600;
pub const THRESHOLD_RANGE: RangeInclusive<u64> = 200..=10_000;
pub const DISCOVERY_TIMEOUT_RANGE: RangeInclusive<u64> = 100..=30_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Runtime settings of the monitor.
///
/// The host owns these values; the engine only reads them. Build through
/// [`MonitorConfig::new`] or [`MonitorConfig::builder`] so every value is range checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Seconds between two scan cycles.
    pub scan_interval_secs: u64,
    /// POST latency (ms) at which a speaker counts as frozen.
    pub threshold_ms: u64,
    /// Upper bound of the mDNS browse window.
    pub browse_timeout_ms: u64,
    /// Upper bound for resolving incomplete service instances.
    pub resolve_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            threshold_ms: DEFAULT_THRESHOLD_MS,
            browse_timeout_ms: DEFAULT_BROWSE_TIMEOUT_MS,
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
        }
    }
}

impl MonitorConfig {
    pub fn new(scan_interval_secs: u64, threshold_ms: u64) -> Result<Self, ConfigError> {
        Self::builder()
            .scan_interval_secs(scan_interval_secs)
            .threshold_ms(threshold_ms)
            .build()
    }

    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Builder seeded with these values, for changing some of them.
    pub fn to_builder(&self) -> MonitorConfigBuilder {
        MonitorConfigBuilder {
            scan_interval_secs: Some(self.scan_interval_secs),
            threshold_ms: Some(self.threshold_ms),
            browse_timeout_ms: Some(self.browse_timeout_ms),
            resolve_timeout_ms: Some(self.resolve_timeout_ms),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn browse_timeout(&self) -> Duration {
        Duration::from_millis(self.browse_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_ms as f64
    }
}

#[derive(Debug, Default, Clone)]
pub struct MonitorConfigBuilder {
    scan_interval_secs: Option<u64>,
    threshold_ms: Option<u64>,
    browse_timeout_ms: Option<u64>,
    resolve_timeout_ms: Option<u64>,
}

impl MonitorConfigBuilder {
    pub fn scan_interval_secs(mut self, value: u64) -> Self {
        self.scan_interval_secs = Some(value);
        self
    }

    pub fn threshold_ms(mut self, value: u64) -> Self {
        self.threshold_ms = Some(value);
        self
    }

    pub fn browse_timeout_ms(mut self, value: u64) -> Self {
        self.browse_timeout_ms = Some(value);
        self
    }

    pub fn resolve_timeout_ms(mut self, value: u64) -> Self {
        self.resolve_timeout_ms = Some(value);
        self
    }

    pub fn build(self) -> Result<MonitorConfig, ConfigError> {
        let defaults: MonitorConfig = MonitorConfig::default();
        Ok(MonitorConfig {
            scan_interval_secs: check(
                "scan_interval_secs",
                self.scan_interval_secs.unwrap_or(defaults.scan_interval_secs),
                SCAN_INTERVAL_RANGE,
            )?,
            threshold_ms: check(
                "threshold_ms",
                self.threshold_ms.unwrap_or(defaults.threshold_ms),
                THRESHOLD_RANGE,
            )?,
            browse_timeout_ms: check(
                "browse_timeout_ms",
                self.browse_timeout_ms.unwrap_or(defaults.browse_timeout_ms),
                DISCOVERY_TIMEOUT_RANGE,
            )?,
            resolve_timeout_ms: check(
                "resolve_timeout_ms",
                self.resolve_timeout_ms.unwrap_or(defaults.resolve_timeout_ms),
                DISCOVERY_TIMEOUT_RANGE,
            )?,
        })
    }
}

fn check(key: &'static str, value: u64, range: RangeInclusive<u64>) -> Result<u64, ConfigError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            key,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}
