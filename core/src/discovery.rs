//! The **Discovery Source** abstraction and the device filter.
//!
//! High-level code depends on [`DiscoverySource`] only. The production
//! implementation is the live mDNS browser in [`mdns`]; tests substitute their own.

use std::net::IpAddr;

use async_trait::async_trait;
use speakerwatch_common::device::{self, TXT_FRIENDLY_NAME, TXT_IDENTIFIER, TXT_MODEL};
use speakerwatch_common::model::DeviceCandidate;
use speakerwatch_protocols::mdns::{MdnsError, ServiceInstance, TxtAttributes};
use thiserror::Error;
use tracing::debug;

mod mdns;

pub use mdns::MdnsDiscovery;

/// The discovery mechanism itself failed. Fatal to the current cycle only.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] MdnsError),
    #[error("{0}")]
    Unavailable(String),
}

/// Finds candidate speakers on the local network.
///
/// Implementations return only candidates that passed [`filter_candidates`].
/// Instances that cannot be resolved are dropped; only a failure of the
/// mechanism as a whole is an error.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn discover(&self) -> Result<Vec<DeviceCandidate>, DiscoveryError>;
}

/// Keeps resolved instances advertising a supported model and at least one address.
pub fn filter_candidates(instances: impl IntoIterator<Item = ServiceInstance>) -> Vec<DeviceCandidate> {
    instances
        .into_iter()
        .filter_map(|instance| {
            let candidate: Option<DeviceCandidate> = to_candidate(&instance);
            if candidate.is_none() {
                debug!("Skipping {}", instance.instance);
            }
            candidate
        })
        .collect()
}

fn to_candidate(instance: &ServiceInstance) -> Option<DeviceCandidate> {
    let txt: &TxtAttributes = instance.txt.as_ref()?;
    let model: String = txt.get_lossy(TXT_MODEL);
    if !device::is_supported_model(&model) {
        return None;
    }
    let address: IpAddr = preferred_address(instance)?;
    Some(DeviceCandidate {
        name: txt.get_lossy(TXT_FRIENDLY_NAME),
        address,
        identifier: txt.get_lossy(TXT_IDENTIFIER),
        model,
    })
}

/// First announced IPv4 address, falling back to the first routable IPv6 one.
/// Link-local IPv6 is skipped: without its scope id it cannot be connected to.
fn preferred_address(instance: &ServiceInstance) -> Option<IpAddr> {
    instance
        .addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| {
            instance.addresses.iter().find(|ip| match ip {
                IpAddr::V6(v6) => !v6.is_unicast_link_local(),
                IpAddr::V4(_) => false,
            })
        })
        .copied()
}
