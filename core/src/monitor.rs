//! # Scan Cycle Orchestrator
//!
//! [`Monitor`] owns everything that survives between cycles: the set of
//! identifiers seen so far, the new-device listeners and the publishing end of
//! the state channel. Readers only ever see whole snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use speakerwatch_common::config::MonitorConfig;
use speakerwatch_common::model::{DeviceCandidate, DeviceRecord, HealthVerdict, ScanSnapshot};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::discovery::DiscoverySource;
use crate::health;
use crate::probe::{self, Prober};

/// Error text of a speaker whose probe task died.
pub const TASK_FAILED_MARKER: &str = "health check aborted";

/// Called with the identifiers that appeared for the first time in a cycle.
pub type NewDevicesListener = Box<dyn Fn(&BTreeSet<String>) + Send + Sync>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Discovery failed; the previous snapshot is still the published one.
    #[error("{0}")]
    UpdateFailed(String),
}

/// What readers get to see.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    /// Latest complete snapshot, `None` until the first successful cycle.
    pub snapshot: Option<Arc<ScanSnapshot>>,
    /// Cause of the most recent cycle if it failed.
    pub last_error: Option<String>,
}

impl MonitorState {
    pub fn is_failed(&self) -> bool {
        self.last_error.is_some()
    }
}

pub struct Monitor {
    discovery: Box<dyn DiscoverySource>,
    prober: Arc<dyn Prober>,
    threshold_ms: f64,
    known: BTreeSet<String>,
    listeners: Vec<NewDevicesListener>,
    state: watch::Sender<MonitorState>,
}

impl Monitor {
    pub fn new(discovery: Box<dyn DiscoverySource>, prober: Arc<dyn Prober>, cfg: &MonitorConfig) -> Self {
        let (state, _) = watch::channel(MonitorState::default());
        Self {
            discovery,
            prober,
            threshold_ms: cfg.threshold(),
            known: BTreeSet::new(),
            listeners: Vec::new(),
            state,
        }
    }

    /// Listeners run synchronously, in registration order, before the snapshot is published.
    pub fn register_new_devices_listener<F>(&mut self, listener: F)
    where
        F: Fn(&BTreeSet<String>) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    pub fn known_identifiers(&self) -> &BTreeSet<String> {
        &self.known
    }

    pub fn threshold_ms(&self) -> f64 {
        self.threshold_ms
    }

    /// Takes the threshold of an already validated configuration. Applies to the next cycle.
    pub fn apply_config(&mut self, cfg: &MonitorConfig) {
        self.threshold_ms = cfg.threshold();
    }

    /// Runs one complete scan cycle.
    ///
    /// Dropping the returned future before it finishes aborts all in-flight
    /// probes and publishes nothing.
    pub async fn run_cycle(&mut self) -> Result<Arc<ScanSnapshot>, MonitorError> {
        let candidates: Vec<DeviceCandidate> = match self.discovery.discover().await {
            Ok(candidates) => candidates,
            Err(e) => {
                let cause: String = format!("mDNS scan failed: {e}");
                warn!("{cause}");
                self.state.send_modify(|state| state.last_error = Some(cause.clone()));
                return Err(MonitorError::UpdateFailed(cause));
            }
        };

        let records: Vec<DeviceRecord> = self.probe_all(candidates).await;
        let snapshot: Arc<ScanSnapshot> = Arc::new(ScanSnapshot::from_records(records));

        let new_identifiers: BTreeSet<String> = snapshot
            .devices
            .keys()
            .filter(|id| !self.known.contains(*id))
            .cloned()
            .collect();
        if !new_identifiers.is_empty() {
            info!("{} new speaker(s) discovered", new_identifiers.len());
            self.known.extend(new_identifiers.iter().cloned());
            for listener in &self.listeners {
                listener(&new_identifiers);
            }
        }

        info!(
            "Scan complete: {} speaker(s), {} healthy",
            snapshot.len(),
            snapshot.healthy_count()
        );
        self.state.send_replace(MonitorState {
            snapshot: Some(Arc::clone(&snapshot)),
            last_error: None,
        });
        Ok(snapshot)
    }

    /// Probes every candidate with an identifier concurrently. Records come
    /// back in discovery order so later duplicates overwrite earlier ones.
    /// A speaker whose task died is reported with every probe failed.
    async fn probe_all(&self, candidates: Vec<DeviceCandidate>) -> Vec<DeviceRecord> {
        let mut tasks: JoinSet<(usize, DeviceRecord)> = JoinSet::new();
        let mut pending: BTreeMap<usize, DeviceCandidate> = BTreeMap::new();
        for (idx, candidate) in candidates.into_iter().enumerate() {
            if candidate.identifier.is_empty() {
                debug!("Skipping {} at {}: no identifier", candidate.name, candidate.address);
                continue;
            }
            pending.insert(idx, candidate.clone());
            let prober: Arc<dyn Prober> = Arc::clone(&self.prober);
            let threshold_ms: f64 = self.threshold_ms;
            tasks.spawn(async move {
                let verdict: HealthVerdict = prober.check(candidate.address, threshold_ms).await;
                (idx, DeviceRecord::merge(candidate, verdict))
            });
        }

        let mut records: BTreeMap<usize, DeviceRecord> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, record)) => {
                    pending.remove(&idx);
                    records.insert(idx, record);
                }
                Err(e) => warn!("Probe task failed: {e}"),
            }
        }
        for (idx, candidate) in pending {
            warn!("No result for {} at {}, marking it unhealthy", candidate.name, candidate.address);
            let verdict: HealthVerdict = health::evaluate(probe::all_failed(TASK_FAILED_MARKER), self.threshold_ms);
            records.insert(idx, DeviceRecord::merge(candidate, verdict));
        }
        records.into_values().collect()
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
