//! Live mDNS browser.
//!
//! A single ephemeral UDP socket sends queries to the multicast group and
//! collects the legacy unicast answers. Unanswered queries are repeated on a
//! backoff, since multicast datagrams get lost. Browsing ends when the window
//! expires or the network goes quiet after the first answer; instances still
//! incomplete afterwards are resolved together under one resolution deadline.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use speakerwatch_common::config::MonitorConfig;
use speakerwatch_common::device::CAST_SERVICE;
use speakerwatch_common::model::DeviceCandidate;
use speakerwatch_protocols::mdns::{self, MdnsRecords, Question, ServiceInstance};
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout};
use tracing::{debug, trace, warn};

use super::{DiscoveryError, DiscoverySource, filter_candidates};

const MAX_SILENCE: Duration = Duration::from_millis(500);
const FIRST_RETRY: Duration = Duration::from_secs(1);
const RECV_BUFFER_SIZE: usize = 9_000;

pub struct MdnsDiscovery {
    target: SocketAddr,
    browse_timeout: Duration,
    resolve_timeout: Duration,
}

impl MdnsDiscovery {
    pub fn new(browse_timeout: Duration, resolve_timeout: Duration) -> Self {
        Self {
            target: SocketAddr::from((mdns::MDNS_IPV4, mdns::MDNS_PORT)),
            browse_timeout,
            resolve_timeout,
        }
    }

    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self::new(cfg.browse_timeout(), cfg.resolve_timeout())
    }

    /// Sends queries to `target` instead of the mDNS multicast group.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    async fn browse(&self, socket: &UdpSocket, records: &mut MdnsRecords) -> Result<(), DiscoveryError> {
        let deadline: Instant = Instant::now() + self.browse_timeout;
        let mut retry: Retry = Retry::new(Instant::now());
        let mut buf: Vec<u8> = vec![0u8; RECV_BUFFER_SIZE];
        let mut answered: bool = false;

        loop {
            let now: Instant = Instant::now();
            if now >= deadline {
                break;
            }
            if !answered && retry.is_due(now) {
                self.send(socket, CAST_SERVICE, Question::Browse).await?;
                retry.sent(now);
            }
            let wait: Duration = if answered {
                (deadline - now).min(MAX_SILENCE)
            } else {
                (deadline - now).min(retry.due - now)
            };

            match timeout(wait, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    if ingest(records, &buf[..len], from) {
                        answered = true;
                    }
                }
                Ok(Err(e)) => return Err(DiscoveryError::Socket(e)),
                Err(_elapsed) => {
                    if answered {
                        trace!("mDNS browse went quiet");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Queries SRV/TXT for every pending instance, then A/AAAA for each SRV
    /// target as it shows up, repeating unanswered queries on a backoff until
    /// all are resolved or the deadline passes.
    async fn resolve(&self, socket: &UdpSocket, records: &mut MdnsRecords, pending: &[String]) -> Result<(), DiscoveryError> {
        let deadline: Instant = Instant::now() + self.resolve_timeout;
        let mut instance_retries: HashMap<String, Retry> = HashMap::new();
        let mut host_retries: HashMap<String, Retry> = HashMap::new();
        let mut buf: Vec<u8> = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let now: Instant = Instant::now();
            let mut next_due: Instant = deadline;
            let mut unresolved: usize = 0;
            for name in pending {
                let instance: ServiceInstance = records.instance(name);
                if instance.is_resolved() {
                    continue;
                }
                unresolved += 1;

                if instance.srv.is_none() || instance.txt.is_none() {
                    let retry: &mut Retry = instance_retries.entry(name.clone()).or_insert_with(|| Retry::new(now));
                    if retry.is_due(now) {
                        self.send(socket, name, Question::Instance).await?;
                        retry.sent(now);
                    }
                    next_due = next_due.min(retry.due);
                }
                if let Some(srv) = instance.srv
                    && instance.addresses.is_empty()
                {
                    let retry: &mut Retry = host_retries.entry(srv.host.clone()).or_insert_with(|| Retry::new(now));
                    if retry.is_due(now) {
                        self.send(socket, &srv.host, Question::Host).await?;
                        retry.sent(now);
                    }
                    next_due = next_due.min(retry.due);
                }
            }
            if unresolved == 0 || now >= deadline {
                return Ok(());
            }

            match timeout(next_due.saturating_duration_since(now), socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    ingest(records, &buf[..len], from);
                }
                Ok(Err(e)) => return Err(DiscoveryError::Socket(e)),
                Err(_elapsed) => {}
            }
        }
    }

    async fn send(&self, socket: &UdpSocket, name: &str, question: Question) -> Result<(), DiscoveryError> {
        let query: Vec<u8> = mdns::create_query(mdns::next_query_id(), name, question)?;
        socket.send_to(&query, self.target).await?;
        Ok(())
    }
}

/// Resend schedule for one outstanding query: immediately, after one second,
/// then with the gap doubling each time.
#[derive(Debug, Clone, Copy)]
struct Retry {
    due: Instant,
    backoff: Duration,
}

impl Retry {
    fn new(now: Instant) -> Self {
        Self {
            due: now,
            backoff: FIRST_RETRY,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        now >= self.due
    }

    fn sent(&mut self, now: Instant) {
        self.due = now + self.backoff;
        self.backoff *= 2;
    }
}

#[async_trait]
impl DiscoverySource for MdnsDiscovery {
    async fn discover(&self) -> Result<Vec<DeviceCandidate>, DiscoveryError> {
        let socket: UdpSocket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let mut records: MdnsRecords = MdnsRecords::new();

        self.browse(&socket, &mut records).await?;

        let names: Vec<String> = records.instances(CAST_SERVICE);
        debug!("Found {} Cast services", names.len());

        let pending: Vec<String> = names
            .iter()
            .filter(|name| !records.instance(name).is_resolved())
            .cloned()
            .collect();
        if !pending.is_empty() {
            // Resolution problems only cost us the affected candidates.
            if let Err(e) = self.resolve(&socket, &mut records, &pending).await {
                warn!("Resolving {} Cast services failed: {e}", pending.len());
            }
        }

        let mut resolved: Vec<ServiceInstance> = Vec::with_capacity(names.len());
        for name in &names {
            let instance: ServiceInstance = records.instance(name);
            if instance.is_resolved() {
                resolved.push(instance);
            } else {
                debug!("Failed to resolve {name}");
            }
        }

        let candidates: Vec<DeviceCandidate> = filter_candidates(resolved);
        debug!("Found {} HK Citation speakers", candidates.len());
        Ok(candidates)
    }
}

fn ingest(records: &mut MdnsRecords, datagram: &[u8], from: SocketAddr) -> bool {
    match records.ingest(datagram) {
        Ok(merged) => merged > 0,
        Err(e) => {
            debug!("Ignoring datagram from {from}: {e}");
            false
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
