//! # Health Evaluator
//!
//! Turns the probe results of one speaker into a [`HealthVerdict`].
//!
//! A speaker is healthy only if both timing probes answered without error and
//! faster than the threshold, and the connectivity probe answered at all. When
//! several things went wrong the connectivity error is reported, since a dead
//! TLS port says more about a frozen speaker than a failed POST. A speaker that
//! is merely slow gets no error text.

use speakerwatch_common::model::{HealthVerdict, ProbeResult};

/// Number of leading timing probes in a probe sequence.
pub const TIMING_PROBES: usize = 2;

pub fn evaluate(probes: Vec<ProbeResult>, threshold_ms: f64) -> HealthVerdict {
    let (timing, rest): (&[ProbeResult], &[ProbeResult]) =
        probes.split_at(probes.len().min(TIMING_PROBES));
    let connectivity: Option<&ProbeResult> = rest.first();

    let worst_post_time: f64 = max_elapsed(timing);
    let post_slow: bool = worst_post_time >= threshold_ms;
    let post_error: Option<&ProbeResult> = timing.iter().find(|p| !p.is_ok());
    let https_error: Option<&ProbeResult> = connectivity.filter(|p| !p.is_ok());

    let healthy: bool = !post_slow && post_error.is_none() && https_error.is_none();
    let error: String = https_error
        .or(post_error)
        .map(|p| p.error.clone())
        .unwrap_or_default();

    HealthVerdict {
        healthy,
        worst_response_ms: max_elapsed(&probes),
        error,
        probes,
    }
}

fn max_elapsed(probes: &[ProbeResult]) -> f64 {
    probes.iter().map(|p| p.elapsed_ms).fold(0.0, f64::max)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
