//! # speakerwatch core
//!
//! Discovery and health-probing engine for HK Citation speakers.
//!
//! One scan cycle flows strictly in one direction:
//!
//! 1. **[`discovery`]**: browse mDNS for Cast services and keep the HK Citation ones.
//! 2. **[`probe`]**: hit every speaker with three timed requests.
//! 3. **[`health`]**: fold the probe results into a verdict.
//! 4. **[`monitor`]**: merge, diff against known devices, notify, publish.
//!
//! The **[`scheduler`]** drives cycles periodically and never lets two overlap.

pub mod discovery;
pub mod health;
pub mod monitor;
pub mod probe;
pub mod scheduler;

pub use discovery::{DiscoveryError, DiscoverySource, MdnsDiscovery};
pub use monitor::{Monitor, MonitorError, MonitorState};
pub use probe::{HttpProber, ProbePlan, Prober};
pub use scheduler::{Scheduler, SchedulerHandle};
