use colored::*;
use speakerwatch_common::model::{DeviceRecord, HealthVerdict, ProbeResult};

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

pub fn status(healthy: bool) -> ColoredString {
    if healthy {
        "HEALTHY".color(colors::HEALTHY).bold()
    } else {
        "FROZEN".color(colors::FROZEN).bold()
    }
}

pub fn millis(ms: f64) -> String {
    format!("{ms:.1} ms")
}

pub fn record_details(record: &DeviceRecord) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![
        ("Address".to_string(), record.address.to_string().color(colors::ADDRESS)),
        ("Model".to_string(), record.model.normal()),
        ("Id".to_string(), record.identifier.dimmed()),
    ];
    details.extend(verdict_lines(record.worst_response_ms, &record.error, &record.probes));
    details
}

pub fn verdict_details(verdict: &HealthVerdict) -> Vec<Detail> {
    verdict_lines(verdict.worst_response_ms, &verdict.error, &verdict.probes)
}

fn verdict_lines(worst_response_ms: f64, error: &str, probes: &[ProbeResult]) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![("Worst".to_string(), millis(worst_response_ms).bold())];
    if !error.is_empty() {
        details.push(("Error".to_string(), error.color(colors::FROZEN)));
    }
    details.extend(probes.iter().map(probe_detail));
    details
}

fn probe_detail(probe: &ProbeResult) -> Detail {
    let value: ColoredString = if probe.is_ok() {
        millis(probe.elapsed_ms).color(colors::TEXT_DEFAULT)
    } else {
        format!("{} ({})", millis(probe.elapsed_ms), probe.error).color(colors::FROZEN)
    };
    (short_label(&probe.label).to_string(), value)
}

/// Tree keys are narrow; probe labels are not.
fn short_label(label: &str) -> &str {
    match label {
        "get_app_device_id" => "Device",
        "reboot" => "Reboot",
        _ if label.starts_with("https") => "TLS",
        _ => label,
    }
}
