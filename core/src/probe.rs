//! # Probe Engine
//!
//! Three requests per speaker, always in the same order:
//!
//! | # | request | port | timeout |
//! |---|---------|------|---------|
//! | 1 | `POST /setup/get_app_device_id` | 8008 | 5 s |
//! | 2 | `POST /setup/reboot` | 8008 | 5 s |
//! | 3 | `GET /setup/eureka_info` over TLS | 8443 | 3 s |
//!
//! The POSTs are latency probes: a hung speaker still accepts them but answers
//! slowly. The HTTPS request is a connectivity probe: a frozen speaker stops
//! completing TLS handshakes on 8443 altogether. Responses are never
//! interpreted, any HTTP status counts as an answer.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use speakerwatch_common::model::{HealthVerdict, ProbeResult};
use tokio::time::{Instant, timeout};
use tracing::debug;

use crate::health;

pub const PORT_HTTP: u16 = 8008;
pub const PORT_HTTPS: u16 = 8443;

pub const POST_TIMEOUT: Duration = Duration::from_secs(5);
pub const HTTPS_TIMEOUT: Duration = Duration::from_secs(3);

/// Error text of a POST probe that ran out of time.
pub const TIMEOUT_MARKER: &str = "timed out";
/// Error text of an HTTPS probe that ran out of time.
pub const FROZEN_MARKER: &str = "frozen (port 8443 timeout)";

pub const HTTPS_LABEL: &str = "https:8443/eureka_info";
const HTTPS_PATH: &str = "/setup/eureka_info";

/// A POST latency probe.
#[derive(Debug, Clone, Copy)]
pub struct TimingEndpoint {
    pub label: &'static str,
    pub path: &'static str,
    payload: (&'static str, &'static str),
}

impl TimingEndpoint {
    pub fn body(&self) -> Value {
        let (key, value): (&str, &str) = self.payload;
        let mut body: Map<String, Value> = Map::new();
        body.insert(key.to_string(), Value::from(value));
        Value::Object(body)
    }
}

pub const TIMING_ENDPOINTS: [TimingEndpoint; 2] = [
    TimingEndpoint {
        label: "get_app_device_id",
        path: "/setup/get_app_device_id",
        payload: ("app_id", "E8C28D3C"),
    },
    TimingEndpoint {
        label: "reboot",
        path: "/setup/reboot",
        payload: ("params", "now"),
    },
];

/// Ports and time limits of one probe run. [`ProbePlan::default`] is what real speakers get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePlan {
    pub http_port: u16,
    pub https_port: u16,
    pub post_timeout: Duration,
    pub https_timeout: Duration,
}

impl Default for ProbePlan {
    fn default() -> Self {
        Self {
            http_port: PORT_HTTP,
            https_port: PORT_HTTPS,
            post_timeout: POST_TIMEOUT,
            https_timeout: HTTPS_TIMEOUT,
        }
    }
}

/// Runs the probe sequence against one address.
///
/// Implementations never fail: every problem ends up in the returned results.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Exactly three results in fixed order: both timing probes, then the connectivity probe.
    async fn probe(&self, address: IpAddr) -> Vec<ProbeResult>;

    /// Probes `address` and evaluates the results against `threshold_ms`.
    async fn check(&self, address: IpAddr, threshold_ms: f64) -> HealthVerdict {
        health::evaluate(self.probe(address).await, threshold_ms)
    }
}

/// [`Prober`] speaking HTTP to real speakers.
pub struct HttpProber {
    client: reqwest::Client,
    plan: ProbePlan,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_plan(ProbePlan::default())
    }

    pub fn with_plan(plan: ProbePlan) -> Result<Self, reqwest::Error> {
        // Speakers present self-signed certificates on 8443.
        let client: reqwest::Client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client, plan })
    }

    pub fn plan(&self) -> &ProbePlan {
        &self.plan
    }

    async fn post(&self, address: IpAddr, endpoint: &TimingEndpoint) -> ProbeResult {
        let url: String = format!(
            "http://{}{}",
            SocketAddr::new(address, self.plan.http_port),
            endpoint.path
        );
        let request = self.client.post(&url).json(&endpoint.body()).send();
        timed(endpoint.label, self.plan.post_timeout, TIMEOUT_MARKER, request).await
    }

    async fn https(&self, address: IpAddr) -> ProbeResult {
        let url: String = format!(
            "https://{}{}",
            SocketAddr::new(address, self.plan.https_port),
            HTTPS_PATH
        );
        let request = self.client.get(&url).send();
        timed(HTTPS_LABEL, self.plan.https_timeout, FROZEN_MARKER, request).await
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, address: IpAddr) -> Vec<ProbeResult> {
        let mut probes: Vec<ProbeResult> = Vec::with_capacity(TIMING_ENDPOINTS.len() + 1);
        for endpoint in &TIMING_ENDPOINTS {
            probes.push(self.post(address, endpoint).await);
        }
        probes.push(self.https(address).await);

        for probe in &probes {
            debug!(%address, label = %probe.label, ms = probe.elapsed_ms, error = %probe.error, "probe finished");
        }
        probes
    }
}

async fn timed<F>(label: &str, limit: Duration, marker: &str, request: F) -> ProbeResult
where
    F: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let start: Instant = Instant::now();
    match timeout(limit, request).await {
        Ok(Ok(_response)) => ProbeResult::success(label, round_ms(start.elapsed())),
        Ok(Err(e)) if e.is_timeout() => ProbeResult::failure(label, timeout_ms(limit), marker),
        Ok(Err(e)) => ProbeResult::failure(label, 0.0, describe(&e)),
        Err(_elapsed) => ProbeResult::failure(label, timeout_ms(limit), marker),
    }
}

/// A full probe sequence in which every request failed with `error`.
pub fn all_failed(error: &str) -> Vec<ProbeResult> {
    TIMING_ENDPOINTS
        .iter()
        .map(|endpoint| endpoint.label)
        .chain([HTTPS_LABEL])
        .map(|label| ProbeResult::failure(label, 0.0, error))
        .collect()
}

/// Milliseconds rounded to one decimal.
pub fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_nanos() as f64 / 100_000.0).round() / 10.0
}

fn timeout_ms(limit: Duration) -> f64 {
    limit.as_nanos() as f64 / 1_000_000.0
}

/// The error and its whole source chain, e.g.
/// `error sending request for url (..): client error (Connect): tcp connect error: Connection refused`.
fn describe(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = vec![error.to_string()];
    let mut source: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(cause) = source {
        let text: String = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}
