pub mod probe;
pub mod scan;
pub mod watch;

use std::net::IpAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use speakerwatch_common::config::{
    DEFAULT_BROWSE_TIMEOUT_MS, DEFAULT_RESOLVE_TIMEOUT_MS, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_THRESHOLD_MS,
    MonitorConfig,
};
use speakerwatch_core::{HttpProber, MdnsDiscovery, Monitor};

#[derive(Parser)]
#[command(name = "speakerwatch")]
#[command(version, about = "Finds HK Citation speakers on the LAN and flags the frozen ones.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Seconds between scan cycles (60-3600)
    #[arg(long, global = true, default_value_t = DEFAULT_SCAN_INTERVAL_SECS)]
    pub interval: u64,

    /// A timing probe at or above this many milliseconds marks a speaker frozen (200-10000)
    #[arg(long, global = true, default_value_t = DEFAULT_THRESHOLD_MS)]
    pub threshold_ms: u64,

    /// Upper bound of the mDNS browse window
    #[arg(long, global = true, default_value_t = DEFAULT_BROWSE_TIMEOUT_MS)]
    pub browse_timeout_ms: u64,

    /// Upper bound for resolving incomplete mDNS answers
    #[arg(long, global = true, default_value_t = DEFAULT_RESOLVE_TIMEOUT_MS)]
    pub resolve_timeout_ms: u64,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan periodically until Ctrl-C; Enter rescans, `interval N` / `threshold N` retune
    #[command(alias = "w")]
    Watch,
    /// Run a single scan cycle
    #[command(alias = "s")]
    Scan,
    /// Probe one address without discovery
    #[command(alias = "p")]
    Probe { address: IpAddr },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
        let cfg: MonitorConfig = MonitorConfig::builder()
            .scan_interval_secs(self.interval)
            .threshold_ms(self.threshold_ms)
            .browse_timeout_ms(self.browse_timeout_ms)
            .resolve_timeout_ms(self.resolve_timeout_ms)
            .build()?;
        Ok(cfg)
    }
}

/// A monitor wired to the live network.
pub fn build_monitor(cfg: &MonitorConfig) -> anyhow::Result<Monitor> {
    let discovery: MdnsDiscovery = MdnsDiscovery::from_config(cfg);
    let prober: HttpProber = HttpProber::new()?;
    Ok(Monitor::new(Box::new(discovery), Arc::new(prober), cfg))
}
