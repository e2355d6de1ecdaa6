//! Wire transport under the gateway. The gateway decides what a failure means;
//! a transport only reports what happened on the wire.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

use super::Method;
use crate::config::AppConfig;

/// Fully prepared outbound call (headers already include auth).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    pub fn text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &ApiRequest) -> Result<RawResponse, TransportError>;

    /// Cheap reachability check of the backend host.
    async fn probe(&self) -> bool;
}

/// `reqwest`-backed transport with a per-request timeout.
pub struct HttpTransport {
    base: String,
    origin: Url,
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let parsed = Url::parse(base_url).context("invalid API base URL")?;
        let mut origin = parsed.clone();
        origin.set_path("/");
        origin.set_query(None);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            origin,
            client,
            probe_timeout: timeout.min(Duration::from_secs(3)),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Self::new(&cfg.api_base_url, cfg.request_timeout())
    }

    pub fn base(&self) -> &str { &self.base }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: &ApiRequest) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base, req.endpoint);
        let method = reqwest::Method::from_bytes(req.method.as_str().as_bytes())
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let mut rb = self.client.request(method, &url);
        for (k, v) in &req.headers {
            rb = rb.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &req.body {
            rb = rb.body(body.to_string());
        }
        let resp = rb.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(classify)?.to_vec();
        debug!(target: "timeclock::api", "{} {} -> {} ({} bytes)", req.method, url, status, body.len());
        Ok(RawResponse { status, body })
    }

    async fn probe(&self) -> bool {
        // any HTTP answer, whatever the status, proves the host is up
        self.client
            .head(self.origin.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
            .is_ok()
    }
}
