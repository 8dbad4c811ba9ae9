use std::collections::BTreeSet;
use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use speakerwatch_common::config::MonitorConfig;
use speakerwatch_common::model::{DeviceRecord, ScanSnapshot};
use speakerwatch_core::{Monitor, MonitorState, Scheduler, SchedulerHandle};
use tokio::sync::{mpsc, watch};
use anyhow::bail;
use tracing::{info, warn};

use crate::commands::{build_monitor, scan};
use crate::terminal::print;

pub async fn watch(cfg: &MonitorConfig) -> anyhow::Result<()> {
    let mut monitor: Monitor = build_monitor(cfg)?;
    monitor.register_new_devices_listener(|identifiers: &BTreeSet<String>| {
        for identifier in identifiers {
            info!("New speaker: {identifier}");
        }
    });

    print::header("watching speakers");
    info!(
        "Scanning every {}s, frozen at {}ms. Enter rescans, `interval <secs>` or `threshold <ms>` retunes, Ctrl-C stops.",
        cfg.scan_interval_secs, cfg.threshold_ms
    );

    let handle: SchedulerHandle = Scheduler::spawn(monitor, cfg.clone());
    let mut state: watch::Receiver<MonitorState> = handle.subscribe();
    let mut lines: mpsc::UnboundedReceiver<String> = spawn_input_reader();
    let mut input_open: bool = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current: MonitorState = state.borrow_and_update().clone();
                report(&current);
            }
            line = lines.recv(), if input_open => match line {
                Some(line) => handle_input(&handle, &line),
                None => input_open = false,
            },
        }
    }

    handle.shutdown().await?;
    print::fat_separator();
    Ok(())
}

/// Stdin is read on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_input_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Rescan,
    Interval(u64),
    Threshold(u64),
}

fn parse_input(line: &str) -> anyhow::Result<Input> {
    let mut words = line.split_whitespace();
    let (Some(key), value) = (words.next(), words.next()) else {
        return Ok(Input::Rescan);
    };
    if words.next().is_some() {
        bail!("Expected `<setting> <value>`, got `{line}`");
    }
    let Some(value) = value else {
        bail!("Missing value for `{key}`");
    };
    let value: u64 = value.parse()?;
    match key {
        "interval" => Ok(Input::Interval(value)),
        "threshold" => Ok(Input::Threshold(value)),
        _ => bail!("Unknown setting `{key}`"),
    }
}

/// Settings typed while watching go through the same range checks as the command line.
fn updated_config(current: &MonitorConfig, input: &Input) -> anyhow::Result<Option<MonitorConfig>> {
    let cfg: MonitorConfig = match input {
        Input::Rescan => return Ok(None),
        Input::Interval(secs) => current.to_builder().scan_interval_secs(*secs).build()?,
        Input::Threshold(ms) => current.to_builder().threshold_ms(*ms).build()?,
    };
    Ok(Some(cfg))
}

fn handle_input(handle: &SchedulerHandle, line: &str) {
    let update = parse_input(line).and_then(|input| updated_config(&handle.config(), &input));
    match update {
        Ok(None) => handle.refresh(),
        Ok(Some(cfg)) => {
            info!(
                "Scanning every {}s, frozen at {}ms",
                cfg.scan_interval_secs, cfg.threshold_ms
            );
            handle.apply_config(cfg);
        }
        Err(e) => warn!("Ignoring input: {e}"),
    }
}

fn report(state: &MonitorState) {
    if let Some(cause) = &state.last_error {
        warn!("Keeping previous results: {cause}");
        return;
    }
    let Some(snapshot) = &state.snapshot else {
        return;
    };
    print_frozen(snapshot);
}

fn print_frozen(snapshot: &Arc<ScanSnapshot>) {
    let frozen: Vec<&DeviceRecord> = snapshot.frozen().collect();
    if frozen.is_empty() {
        return;
    }
    warn!("{} of {} speaker(s) frozen", frozen.len(), snapshot.len());
    scan::print_records(&frozen);
}
