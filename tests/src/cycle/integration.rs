use crate::util::{self, HttpServer, MdnsResponder, Record, TYPE_PTR};
use speakerwatch_common::config::MonitorConfig;
use speakerwatch_common::model::{DeviceRecord, ScanSnapshot};
use speakerwatch_core::discovery::MdnsDiscovery;
use speakerwatch_core::monitor::{Monitor, MonitorState};
use speakerwatch_core::probe::{FROZEN_MARKER, HttpProber, ProbePlan};
use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SERVICE: &str = "_googlecast._tcp.local";
const OFFICE: &str = "HK-Citation-Bar-office._googlecast._tcp.local";

/// Full cycle against local stand-ins: mDNS finds a speaker on loopback whose
/// setup API answers but whose TLS port has gone silent.
#[tokio::test]
async fn frozen_speaker_is_found_and_flagged() -> anyhow::Result<()> {
    let answers: HashMap<(String, u16), Vec<Record>> = HashMap::from([(
        (SERVICE.to_string(), TYPE_PTR),
        vec![
            Record::ptr(SERVICE, OFFICE),
            Record::srv(OFFICE, "office.local", 8009),
            Record::txt(OFFICE, &["id=office-id", "md=HK Citation Bar", "fn=Office"]),
            Record::a("office.local", Ipv4Addr::LOCALHOST),
        ],
    )]);
    let responder: MdnsResponder = util::spawn_responder(answers).await?;
    let server: HttpServer = util::spawn_http(HashMap::new()).await?;

    let discovery: MdnsDiscovery =
        MdnsDiscovery::new(Duration::from_millis(1000), Duration::from_millis(300)).with_target(responder.addr);
    let prober: HttpProber = HttpProber::with_plan(ProbePlan {
        http_port: server.port,
        https_port: util::silent_port().await?,
        post_timeout: Duration::from_millis(300),
        https_timeout: Duration::from_millis(200),
    })?;

    let mut monitor: Monitor = Monitor::new(Box::new(discovery), Arc::new(prober), &MonitorConfig::default());
    let announced: Arc<Mutex<Vec<BTreeSet<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&announced);
    monitor.register_new_devices_listener(move |ids| sink.lock().unwrap().push(ids.clone()));

    let snapshot: Arc<ScanSnapshot> = monitor.run_cycle().await?;

    assert_eq!(snapshot.len(), 1);
    let office: &DeviceRecord = snapshot.get("office-id").expect("office speaker in snapshot");
    assert_eq!(office.name, "Office");
    assert_eq!(office.model, "HK Citation Bar");
    assert_eq!(office.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert!(!office.healthy);
    assert_eq!(office.error, FROZEN_MARKER);
    assert_eq!(office.probes.len(), 3);
    assert_eq!(snapshot.frozen().count(), 1);

    let state: MonitorState = monitor.state();
    assert!(!state.is_failed());
    assert!(state.snapshot.is_some());

    // The same speaker on the next cycle is not news.
    monitor.run_cycle().await?;
    let announced: Vec<BTreeSet<String>> = announced.lock().unwrap().clone();
    assert_eq!(announced, vec![BTreeSet::from(["office-id".to_string()])]);
    Ok(())
}
