use crate::util::{self, MdnsResponder, Record, TYPE_A, TYPE_PTR, TYPE_SRV};
use speakerwatch_common::model::DeviceCandidate;
use speakerwatch_core::discovery::{DiscoverySource, MdnsDiscovery};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const SERVICE: &str = "_googlecast._tcp.local";
const KITCHEN: &str = "HK-Citation-One-kitchen._googlecast._tcp.local";
const TV: &str = "Chromecast-tv._googlecast._tcp.local";
const DEN: &str = "HK-Citation-500-den._googlecast._tcp.local";
const GHOST: &str = "HK-Citation-100-ghost._googlecast._tcp.local";

fn key(name: &str, qtype: u16) -> (String, u16) {
    (name.to_ascii_lowercase(), qtype)
}

fn discovery(responder: &MdnsResponder) -> MdnsDiscovery {
    MdnsDiscovery::new(Duration::from_millis(1500), Duration::from_millis(500)).with_target(responder.addr)
}

/// One responder playing a whole network:
/// - the kitchen speaker answers the browse with everything at once,
/// - a Chromecast answers completely but is not a supported model,
/// - the den speaker only sends its PTR and must be resolved,
/// - the ghost is advertised but never answers resolution queries.
fn network() -> HashMap<(String, u16), Vec<Record>> {
    let browse: Vec<Record> = vec![
        Record::ptr(SERVICE, KITCHEN),
        Record::srv(KITCHEN, "kitchen.local", 8009),
        Record::txt(KITCHEN, &["id=kitchen-id", "md=HK Citation One", "fn=Kitchen"]),
        Record::a("kitchen.local", Ipv4Addr::new(10, 0, 0, 11)),
        Record::ptr(SERVICE, TV),
        Record::srv(TV, "tv.local", 8009),
        Record::txt(TV, &["id=tv-id", "md=Chromecast", "fn=Living Room TV"]),
        Record::a("tv.local", Ipv4Addr::new(10, 0, 0, 12)),
        Record::ptr(SERVICE, DEN),
        Record::ptr(SERVICE, GHOST),
    ];
    let den_instance: Vec<Record> = vec![
        Record::srv(DEN, "den.local", 8009),
        Record::txt(DEN, &["id=den-id", "md=HK Citation 500", "fn=Den"]),
    ];
    let den_host: Vec<Record> = vec![Record::a("den.local", Ipv4Addr::new(10, 0, 0, 13))];

    HashMap::from([
        (key(SERVICE, TYPE_PTR), browse),
        (key(DEN, TYPE_SRV), den_instance),
        (key("den.local", TYPE_A), den_host),
    ])
}

#[tokio::test]
async fn discovers_only_supported_speakers() -> anyhow::Result<()> {
    let responder: MdnsResponder = util::spawn_responder(network()).await?;

    let mut candidates: Vec<DeviceCandidate> = discovery(&responder).discover().await?;
    candidates.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    assert_eq!(
        candidates,
        vec![
            DeviceCandidate {
                name: "Den".to_string(),
                address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 13)),
                identifier: "den-id".to_string(),
                model: "HK Citation 500".to_string(),
            },
            DeviceCandidate {
                name: "Kitchen".to_string(),
                address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 11)),
                identifier: "kitchen-id".to_string(),
                model: "HK Citation One".to_string(),
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn incomplete_instances_are_resolved_with_follow_up_queries() -> anyhow::Result<()> {
    let responder: MdnsResponder = util::spawn_responder(network()).await?;

    discovery(&responder).discover().await?;

    let queries: Vec<(String, u16)> = responder.queries.lock().unwrap().clone();
    assert_eq!(queries.first(), Some(&key(SERVICE, TYPE_PTR)));
    assert!(queries.contains(&key(DEN, TYPE_SRV)));
    assert!(queries.contains(&key(GHOST, TYPE_SRV)));
    assert!(queries.contains(&key("den.local", TYPE_A)));
    // Complete instances need no follow-up.
    assert!(!queries.contains(&key(KITCHEN, TYPE_SRV)));
    assert!(!queries.contains(&key(TV, TYPE_SRV)));
    Ok(())
}

#[tokio::test]
async fn unanswered_instance_is_dropped_within_deadline() -> anyhow::Result<()> {
    let answers: HashMap<(String, u16), Vec<Record>> =
        HashMap::from([(key(SERVICE, TYPE_PTR), vec![Record::ptr(SERVICE, GHOST)])]);
    let responder: MdnsResponder = util::spawn_responder(answers).await?;

    let started: tokio::time::Instant = tokio::time::Instant::now();
    let candidates: Vec<DeviceCandidate> = discovery(&responder).discover().await?;

    assert!(candidates.is_empty());
    // Quiet after the first answer ends the browse early, then one resolve window.
    assert!(started.elapsed() < Duration::from_millis(1500));
    Ok(())
}

#[tokio::test]
async fn silent_network_yields_no_candidates() -> anyhow::Result<()> {
    let responder: MdnsResponder = util::spawn_responder(HashMap::new()).await?;

    let candidates: Vec<DeviceCandidate> = MdnsDiscovery::new(Duration::from_millis(200), Duration::from_millis(200))
        .with_target(responder.addr)
        .discover()
        .await?;

    assert!(candidates.is_empty());
    Ok(())
}

#[tokio::test]
async fn lost_queries_are_sent_again() -> anyhow::Result<()> {
    let responder: MdnsResponder = util::spawn_lossy_responder(network()).await?;

    let mut candidates: Vec<DeviceCandidate> = MdnsDiscovery::new(Duration::from_millis(3000), Duration::from_millis(4000))
        .with_target(responder.addr)
        .discover()
        .await?;
    candidates.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    let identifiers: Vec<&str> = candidates.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["den-id", "kitchen-id"]);

    let queries: Vec<(String, u16)> = responder.queries.lock().unwrap().clone();
    let sent = |k: (String, u16)| queries.iter().filter(|q| **q == k).count();
    assert_eq!(sent(key(SERVICE, TYPE_PTR)), 2);
    assert_eq!(sent(key(DEN, TYPE_SRV)), 2);
    assert_eq!(sent(key("den.local", TYPE_A)), 2);
    // Still unanswered, so repeated until the deadline.
    assert!(sent(key(GHOST, TYPE_SRV)) >= 2);
    Ok(())
}
