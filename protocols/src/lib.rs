//! Wire-level codecs used by the discovery engine.
//!
//! Only multicast DNS is needed: queries are built and responses parsed here,
//! while socket handling stays in `speakerwatch-core`.

pub mod mdns;
