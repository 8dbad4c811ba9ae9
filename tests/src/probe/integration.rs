use crate::util::{self, HttpServer, Reply, Request};
use speakerwatch_common::model::{HealthVerdict, ProbeResult};
use speakerwatch_core::probe::{FROZEN_MARKER, HTTPS_LABEL, HttpProber, ProbePlan, Prober};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn plan(http_port: u16, https_port: u16) -> ProbePlan {
    ProbePlan {
        http_port,
        https_port,
        post_timeout: Duration::from_millis(300),
        https_timeout: Duration::from_millis(200),
    }
}

/// Both POSTs hit the speaker's setup API with the expected payloads.
#[tokio::test]
async fn posts_reach_setup_endpoints_in_order() -> anyhow::Result<()> {
    let server: HttpServer = util::spawn_http(HashMap::new()).await?;
    let prober: HttpProber = HttpProber::with_plan(plan(server.port, util::refused_port().await?))?;

    let probes: Vec<ProbeResult> = prober.probe(LOCALHOST).await;

    let labels: Vec<&str> = probes.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, ["get_app_device_id", "reboot", HTTPS_LABEL]);
    assert!(probes[0].is_ok(), "unexpected error: {}", probes[0].error);
    assert!(probes[1].is_ok(), "unexpected error: {}", probes[1].error);

    let requests: Vec<Request> = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/setup/get_app_device_id");
    assert_eq!(requests[0].body, r#"{"app_id":"E8C28D3C"}"#);
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[1].path, "/setup/reboot");
    assert_eq!(requests[1].body, r#"{"params":"now"}"#);
    Ok(())
}

#[tokio::test]
async fn slow_answer_is_timed() -> anyhow::Result<()> {
    let replies: HashMap<&'static str, Reply> =
        HashMap::from([("/setup/reboot", Reply::After(Duration::from_millis(150)))]);
    let server: HttpServer = util::spawn_http(replies).await?;
    let prober: HttpProber = HttpProber::with_plan(plan(server.port, util::refused_port().await?))?;

    let probes: Vec<ProbeResult> = prober.probe(LOCALHOST).await;

    assert!(probes[1].is_ok());
    assert!(probes[1].elapsed_ms >= 150.0, "reboot took {}ms", probes[1].elapsed_ms);
    assert!(probes[1].elapsed_ms < 300.0, "reboot took {}ms", probes[1].elapsed_ms);
    assert!(probes[0].elapsed_ms < probes[1].elapsed_ms);

    let verdict: HealthVerdict = prober.check(LOCALHOST, 100.0).await;
    assert!(!verdict.healthy);
    assert!(verdict.worst_response_ms >= 150.0);
    Ok(())
}

#[tokio::test]
async fn hung_post_is_recorded_as_timeout() -> anyhow::Result<()> {
    let replies: HashMap<&'static str, Reply> = HashMap::from([("/setup/reboot", Reply::Never)]);
    let server: HttpServer = util::spawn_http(replies).await?;
    let prober: HttpProber = HttpProber::with_plan(plan(server.port, util::refused_port().await?))?;

    let probes: Vec<ProbeResult> = prober.probe(LOCALHOST).await;

    assert!(probes[0].is_ok());
    assert_eq!(probes[1], ProbeResult::failure("reboot", 300.0, "timed out"));
    Ok(())
}

/// A port that accepts TCP but never completes the TLS handshake is how a frozen speaker looks.
#[tokio::test]
async fn silent_https_port_is_reported_frozen() -> anyhow::Result<()> {
    let server: HttpServer = util::spawn_http(HashMap::new()).await?;
    let prober: HttpProber = HttpProber::with_plan(plan(server.port, util::silent_port().await?))?;

    let verdict: HealthVerdict = prober.check(LOCALHOST, 1000.0).await;

    assert!(!verdict.healthy);
    assert_eq!(verdict.error, FROZEN_MARKER);
    assert_eq!(verdict.probes[2], ProbeResult::failure(HTTPS_LABEL, 200.0, FROZEN_MARKER));
    assert_eq!(verdict.worst_response_ms, 200.0);
    Ok(())
}

#[tokio::test]
async fn refused_connections_cost_nothing() -> anyhow::Result<()> {
    let closed: u16 = util::refused_port().await?;
    let prober: HttpProber = HttpProber::with_plan(plan(closed, closed))?;

    let verdict: HealthVerdict = prober.check(LOCALHOST, 1000.0).await;

    assert!(!verdict.healthy);
    assert_eq!(verdict.probes.len(), 3);
    for probe in &verdict.probes {
        assert_eq!(probe.elapsed_ms, 0.0, "{} should fail fast", probe.label);
        assert!(!probe.error.is_empty());
    }
    // The connectivity failure outranks the POST failures.
    assert_eq!(verdict.error, verdict.probes[2].error);
    assert_eq!(verdict.worst_response_ms, 0.0);
    Ok(())
}
