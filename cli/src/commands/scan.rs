use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::*;
use speakerwatch_common::config::MonitorConfig;
use speakerwatch_common::model::{DeviceRecord, ScanSnapshot};
use speakerwatch_core::Monitor;
use tracing::warn;

use crate::commands::build_monitor;
use crate::terminal::{colors, format, print, spinner};

pub async fn scan(cfg: &MonitorConfig, json: bool) -> anyhow::Result<()> {
    let mut monitor: Monitor = build_monitor(cfg)?;

    let start_time: Instant = Instant::now();
    let snapshot: Arc<ScanSnapshot> = {
        let _spinner = (!json).then(|| spinner::start("Looking for HK Citation speakers..."));
        monitor.run_cycle().await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        return Ok(());
    }

    if snapshot.is_empty() {
        warn!("No HK Citation speakers found");
        return Ok(());
    }

    print::header("speaker health");
    print_snapshot(&snapshot);
    print_summary(&snapshot, start_time.elapsed());
    Ok(())
}

pub fn print_snapshot(snapshot: &ScanSnapshot) {
    let mut records: Vec<&DeviceRecord> = snapshot.devices.values().collect();
    records.sort_by(|a, b| a.name.cmp(&b.name).then(a.identifier.cmp(&b.identifier)));
    print_records(&records);
}

pub fn print_records(records: &[&DeviceRecord]) {
    for (idx, record) in records.iter().enumerate() {
        print::tree_head(idx, &record.name, format::status(record.healthy));
        print::as_tree_one_level(format::record_details(record));
        if idx + 1 != records.len() {
            print::blank();
        }
    }
}

fn print_summary(snapshot: &ScanSnapshot, total_time: Duration) {
    let healthy: ColoredString = format!("{} healthy", snapshot.healthy_count())
        .color(colors::HEALTHY)
        .bold();
    let frozen: ColoredString = format!("{} frozen", snapshot.len() - snapshot.healthy_count())
        .color(colors::FROZEN)
        .bold();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: String = format!("Scan Complete: {healthy}, {frozen} in {total_time}");

    print::fat_separator();
    print::centerln(&output);
}
