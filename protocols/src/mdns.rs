//! # mDNS codec
//!
//! Builds one-shot DNS-SD queries and folds the records of any number of
//! response datagrams into an [`MdnsRecords`] cache, from which complete
//! service instances can be read back.
//!
//! Names are compared case-insensitively; every key stored in the cache is
//! lowercased.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use dns_parser::{Builder, Packet, QueryClass, QueryType, RData, ResourceRecord};
use thiserror::Error;
use tracing::trace;

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

#[derive(Debug, Error)]
pub enum MdnsError {
    #[error("failed to parse mDNS packet: {0}")]
    Parse(#[from] dns_parser::Error),
    #[error("mDNS query does not fit into a single datagram")]
    Truncated,
}

/// What a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    /// Enumerate instances of a service type.
    Browse,
    /// SRV + TXT of a single instance.
    Instance,
    /// Addresses of a host name.
    Host,
}

/// Creates a query packet for `name`.
///
/// Queries are sent from an ephemeral port, so responders answer with a
/// legacy unicast response carrying the same transaction `id`.
pub fn create_query(id: u16, name: &str, question: Question) -> Result<Vec<u8>, MdnsError> {
    let mut builder: Builder = Builder::new_query(id, false);
    match question {
        Question::Browse => {
            builder.add_question(name, false, QueryType::PTR, QueryClass::IN);
        }
        Question::Instance => {
            builder.add_question(name, false, QueryType::SRV, QueryClass::IN);
            builder.add_question(name, false, QueryType::TXT, QueryClass::IN);
        }
        Question::Host => {
            builder.add_question(name, false, QueryType::A, QueryClass::IN);
            builder.add_question(name, false, QueryType::AAAA, QueryClass::IN);
        }
    }
    builder.build().map_err(|_| MdnsError::Truncated)
}

/// Random transaction id for a new query.
pub fn next_query_id() -> u16 {
    rand::random::<u16>()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub host: String,
    pub port: u16,
}

/// TXT attributes of one instance, keyed by lowercased attribute name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TxtAttributes {
    entries: HashMap<String, Vec<u8>>,
}

impl TxtAttributes {
    /// Parses `key=value` strings. A bare `key` maps to an empty value.
    pub fn from_strings<'a>(strings: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut entries: HashMap<String, Vec<u8>> = HashMap::new();
        for raw in strings {
            if raw.is_empty() {
                continue;
            }
            let (key, value): (&[u8], &[u8]) = match raw.iter().position(|b| *b == b'=') {
                Some(split) => (&raw[..split], &raw[split + 1..]),
                None => (raw, &[]),
            };
            let key: String = String::from_utf8_lossy(key).to_ascii_lowercase();
            // RFC 6763 6.4: only the first occurrence of a key counts.
            entries.entry(key).or_insert_with(|| value.to_vec());
        }
        Self { entries }
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(&key.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// Value of `key` decoded as UTF-8, invalid sequences replaced. Missing keys decode to `""`.
    pub fn get_lossy(&self, key: &str) -> String {
        self.raw(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully or partially resolved service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub instance: String,
    pub srv: Option<SrvTarget>,
    pub txt: Option<TxtAttributes>,
    /// In announcement order, without duplicates.
    pub addresses: Vec<IpAddr>,
}

impl ServiceInstance {
    pub fn is_resolved(&self) -> bool {
        self.txt.is_some() && !self.addresses.is_empty()
    }
}

/// Records accumulated from mDNS responses.
#[derive(Debug, Default, Clone)]
pub struct MdnsRecords {
    /// service type -> instance names, in the order they were first seen
    pointers: HashMap<String, Vec<String>>,
    services: HashMap<String, SrvTarget>,
    texts: HashMap<String, TxtAttributes>,
    /// host name -> addresses, in the order they were first seen
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl MdnsRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a datagram and merges every answer and additional record.
    /// Returns the number of records merged.
    pub fn ingest(&mut self, data: &[u8]) -> Result<usize, MdnsError> {
        let packet: Packet = Packet::parse(data)?;
        let mut merged: usize = 0;
        for record in packet
            .answers
            .iter()
            .chain(packet.nameservers.iter())
            .chain(packet.additional.iter())
        {
            if self.merge_record(record) {
                merged += 1;
            }
        }
        Ok(merged)
    }

    fn merge_record(&mut self, record: &ResourceRecord) -> bool {
        let owner: String = normalize(&record.name.to_string());
        match &record.data {
            RData::PTR(ptr) => {
                let instance: String = normalize(&ptr.0.to_string());
                if owner.ends_with(".arpa") {
                    return false;
                }
                let instances: &mut Vec<String> = self.pointers.entry(owner).or_default();
                if !instances.contains(&instance) {
                    instances.push(instance);
                }
            }
            RData::SRV(srv) => {
                self.services.insert(
                    owner,
                    SrvTarget {
                        host: normalize(&srv.target.to_string()),
                        port: srv.port,
                    },
                );
            }
            RData::TXT(txt) => {
                self.texts.insert(owner, TxtAttributes::from_strings(txt.iter()));
            }
            RData::A(a) => self.add_address(owner, IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => self.add_address(owner, IpAddr::V6(aaaa.0)),
            _ => {
                trace!(owner = %owner, "ignoring unsupported mDNS record");
                return false;
            }
        }
        true
    }

    fn add_address(&mut self, host: String, address: IpAddr) {
        let addresses: &mut Vec<IpAddr> = self.hosts.entry(host).or_default();
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    /// Instance names announced for `service`.
    pub fn instances(&self, service: &str) -> Vec<String> {
        self.pointers
            .get(&normalize(service))
            .cloned()
            .unwrap_or_default()
    }

    /// Everything known so far about `instance`.
    pub fn instance(&self, instance: &str) -> ServiceInstance {
        let key: String = normalize(instance);
        let srv: Option<SrvTarget> = self.services.get(&key).cloned();
        let addresses: Vec<IpAddr> = srv
            .as_ref()
            .and_then(|target| self.hosts.get(&target.host))
            .cloned()
            .unwrap_or_default();
        ServiceInstance {
            instance: key.clone(),
            txt: self.texts.get(&key).cloned(),
            srv,
            addresses,
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
