//! # speakerwatch common
//!
//! Types shared by every crate of the workspace:
//!
//! * **[`model`]**: candidates, probe results, verdicts, device records and snapshots.
//! * **[`config`]**: the validated monitor configuration.
//! * **[`device`]**: constants describing the monitored device family.

pub mod config;
pub mod device;
pub mod model;
