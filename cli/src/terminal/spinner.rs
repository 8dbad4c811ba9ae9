use std::sync::Mutex;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

/// The spinner currently on screen, if any. Log output is drawn around it.
static ACTIVE: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Clears the spinner when dropped.
pub struct SpinnerGuard {
    spinner: ProgressBar,
}

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
        if let Ok(mut active) = ACTIVE.lock() {
            *active = None;
        }
    }
}

pub fn start(msg: &str) -> SpinnerGuard {
    let spinner: ProgressBar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        spinner.set_style(style.tick_strings(TICKS));
    }
    spinner.set_message(msg.italic().to_string());
    spinner.enable_steady_tick(TICK_INTERVAL);

    if let Ok(mut active) = ACTIVE.lock() {
        *active = Some(spinner.clone());
    }
    SpinnerGuard { spinner }
}

/// Runs `f` with the spinner hidden, so whatever `f` prints is not torn by a redraw.
pub fn suspend<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let active: Option<ProgressBar> = ACTIVE.lock().ok().and_then(|active| active.clone());
    match active {
        Some(spinner) => spinner.suspend(f),
        None => f(),
    }
}
