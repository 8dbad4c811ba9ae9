//! Periodic driver for [`Monitor`].
//!
//! One eager cycle at startup, then one per interval. The next wait only
//! starts once the active cycle is completely done, so cycles never overlap.
//! A new [`MonitorConfig`] re-arms the running wait with its interval and
//! hands its threshold to the monitor before the next cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use speakerwatch_common::config::MonitorConfig;

use crate::monitor::{Monitor, MonitorState};

pub struct Scheduler;

impl Scheduler {
    /// Moves `monitor` onto a background task and starts cycling.
    pub fn spawn(monitor: Monitor, cfg: MonitorConfig) -> SchedulerHandle {
        let state: watch::Receiver<MonitorState> = monitor.subscribe();
        let (config_tx, config_rx) = watch::channel(cfg);
        let refresh: Arc<Notify> = Arc::new(Notify::new());
        let shutdown: Arc<Notify> = Arc::new(Notify::new());

        let task: JoinHandle<Monitor> = tokio::spawn(drive(
            monitor,
            config_rx,
            Arc::clone(&refresh),
            Arc::clone(&shutdown),
        ));

        SchedulerHandle {
            state,
            config: config_tx,
            refresh,
            shutdown,
            task,
        }
    }
}

pub struct SchedulerHandle {
    state: watch::Receiver<MonitorState>,
    config: watch::Sender<MonitorConfig>,
    refresh: Arc<Notify>,
    shutdown: Arc<Notify>,
    task: JoinHandle<Monitor>,
}

impl SchedulerHandle {
    /// Receiver that reports every published state, including the first one.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    pub fn state(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    /// Requests an extra cycle. Served right away when idle, otherwise after
    /// the active cycle; several requests in between collapse into one.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// The interval takes effect for the wait that is currently running or
    /// the next one, the threshold from the next cycle on.
    pub fn apply_config(&self, cfg: MonitorConfig) {
        self.config.send_replace(cfg);
    }

    pub fn config(&self) -> MonitorConfig {
        self.config.borrow().clone()
    }

    /// Stops the driver, abandoning an in-flight cycle, and hands the monitor back.
    pub async fn shutdown(self) -> Result<Monitor, JoinError> {
        self.shutdown.notify_one();
        self.task.await
    }
}

async fn drive(
    mut monitor: Monitor,
    mut config: watch::Receiver<MonitorConfig>,
    refresh: Arc<Notify>,
    shutdown: Arc<Notify>,
) -> Monitor {
    info!("Scheduler started");
    loop {
        monitor.apply_config(&config.borrow_and_update());

        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!("Shutdown requested, abandoning scan cycle");
                break;
            }
            result = monitor.run_cycle() => {
                if let Err(e) = result {
                    warn!("Update failed: {e}");
                }
            }
        }

        let idle_since: Instant = Instant::now();
        let wait = tokio::time::sleep(config.borrow_and_update().scan_interval());
        tokio::pin!(wait);
        let mut config_open: bool = true;

        let stop: bool = loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break true,
                _ = refresh.notified() => {
                    debug!("Manual refresh");
                    break false;
                }
                changed = config.changed(), if config_open => {
                    if changed.is_ok() {
                        let next: Duration = config.borrow_and_update().scan_interval();
                        debug!("Scan interval changed to {}s", next.as_secs());
                        wait.as_mut().reset(idle_since + next);
                    } else {
                        config_open = false;
                    }
                }
                _ = &mut wait => break false,
            }
        };
        if stop {
            break;
        }
    }
    info!("Scheduler stopped");
    monitor
}
