//!
//! timeclock API gateway
//! ---------------------
//! Every outbound call goes through `ApiGateway::request`. The gateway owns the
//! current bearer token and, in permissive mode, answers with a synthetic payload
//! (shape-identical to the live backend's) whenever the backend cannot. Each
//! response is tagged with its `ResponseSource`, so callers and tests can always
//! tell live data from fallback data.
//!
//! Nothing is retried and nothing is idempotent: two `create_working_time` calls
//! create two records. Callers that must not duplicate work guard themselves
//! (see `attendance`).

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AppConfig, FallbackMode};
use crate::error::{AppError, AppResult};
use crate::identity::token;

pub mod endpoints;
pub mod fake;
pub mod fallback;
pub mod transport;

pub use fake::{FakeReply, FakeTransport};
pub use transport::{ApiRequest, HttpTransport, RawResponse, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Live,
    Fallback,
}

/// Response as seen by callers. `body` is `None` for 204 / empty bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub source: ResponseSource,
    pub status: u16,
    pub body: Option<serde_json::Value>,
}

static NULL: serde_json::Value = serde_json::Value::Null;

impl ApiResponse {
    pub fn live(status: u16, body: Option<serde_json::Value>) -> Self {
        Self { source: ResponseSource::Live, status, body }
    }

    pub fn fallback(body: serde_json::Value) -> Self {
        Self { source: ResponseSource::Fallback, status: 200, body: Some(body) }
    }

    pub fn is_fallback(&self) -> bool { self.source == ResponseSource::Fallback }

    pub fn is_live(&self) -> bool { self.source == ResponseSource::Live }

    /// Body, or JSON null when empty.
    pub fn json(&self) -> &serde_json::Value { self.body.as_ref().unwrap_or(&NULL) }

    /// The `data` member most collection endpoints wrap their payload in.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.body.as_ref().and_then(|b| b.get("data"))
    }

    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_value(self.json().clone())?)
    }

    pub fn parse_data<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        let data = self.data().ok_or_else(|| AppError::invalid_response("response has no data member"))?;
        Ok(serde_json::from_value(data.clone())?)
    }
}

/// Single chokepoint for outbound calls.
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    token: RwLock<Option<String>>,
    mode: FallbackMode,
    probe_backend: bool,
}

fn auth_rejection(endpoint: &str, status: u16, text: &str) -> Option<AppError> {
    if !(400..500).contains(&status) || !endpoint.starts_with("/auth/") {
        return None;
    }
    let detail = if text.is_empty() { format!("HTTP {}", status) } else { format!("HTTP {}: {}", status, text) };
    let code = match path_of(endpoint) {
        "/auth/login" => "invalid_credentials",
        "/auth/refresh" => "refresh_rejected",
        _ => "not_authenticated",
    };
    Some(AppError::auth(code.to_string(), detail))
}

/// Endpoint without its query string.
pub(crate) fn path_of(endpoint: &str) -> &str {
    endpoint.split_once('?').map(|(p, _)| p).unwrap_or(endpoint)
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>, mode: FallbackMode) -> Self {
        Self { transport, token: RwLock::new(None), mode, probe_backend: true }
    }

    /// Gateway over `reqwest` configured from `cfg`.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::from_config(cfg)?;
        Ok(Self::new(Arc::new(transport), cfg.fallback).with_probe(cfg.probe_backend))
    }

    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe_backend = probe;
        self
    }

    pub fn mode(&self) -> FallbackMode { self.mode }

    pub fn set_auth_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
        debug!(target: "timeclock::api", "auth token set");
    }

    pub fn clear_auth_token(&self) {
        if self.token.write().take().is_some() {
            debug!(target: "timeclock::api", "auth token cleared");
        }
    }

    pub fn auth_token(&self) -> Option<String> { self.token.read().clone() }

    fn build_headers(&self, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = vec![("Content-Type".into(), "application/json".into())];
        for (k, v) in extra {
            headers.retain(|(hk, _)| !hk.eq_ignore_ascii_case(k));
            headers.push((k.clone(), v.clone()));
        }
        if let Some(t) = self.token.read().as_ref() {
            if token::is_expired(t) {
                // an expired bearer is never sent; the call goes out unauthenticated
                debug!(target: "timeclock::api", "auth token expired, not attached");
            } else {
                headers.retain(|(hk, _)| !hk.eq_ignore_ascii_case("authorization"));
                headers.push(("Authorization".into(), format!("Bearer {}", t)));
            }
        }
        headers
    }

    fn substitute(&self, req: &ApiRequest, why: &str) -> ApiResponse {
        warn!(target: "timeclock::api", "{} {}: {}, using fallback response", req.method, req.endpoint, why);
        ApiResponse::fallback(fallback::fallback_body(&req.endpoint, req.method, req.body.as_ref(), chrono::Utc::now()))
    }

    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<serde_json::Value>,
        headers: &[(String, String)],
    ) -> AppResult<ApiResponse> {
        let req = ApiRequest {
            endpoint: endpoint.to_string(),
            method,
            body,
            headers: self.build_headers(headers),
        };
        debug!(target: "timeclock::api", "request {} {}", method, endpoint);
        let permissive = self.mode == FallbackMode::Permissive;

        if permissive && self.probe_backend && !self.transport.probe().await {
            return Ok(self.substitute(&req, "backend not available"));
        }

        let raw = match self.transport.send(&req).await {
            Ok(raw) => raw,
            Err(e) if permissive => return Ok(self.substitute(&req, &e.to_string())),
            Err(TransportError::Timeout) => {
                return Err(AppError::network("timeout".to_string(), format!("{} {} timed out", method, endpoint)))
            }
            Err(TransportError::Unreachable(m)) => {
                return Err(AppError::network("network_unavailable".to_string(), m))
            }
        };

        if !raw.is_success() {
            let text = raw.text();
            if let Some(e) = auth_rejection(endpoint, raw.status, &text) {
                return Err(e);
            }
            if permissive {
                return Ok(self.substitute(&req, &format!("HTTP {}", raw.status)));
            }
            return Err(AppError::http(raw.status, text));
        }

        if raw.status == 204 || raw.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(ApiResponse::live(raw.status, None));
        }
        match serde_json::from_slice::<serde_json::Value>(&raw.body) {
            Ok(v) => Ok(ApiResponse::live(raw.status, Some(v))),
            Err(e) if permissive => Ok(self.substitute(&req, &format!("undecodable body: {}", e))),
            Err(e) => Err(AppError::invalid_response(format!("{} {}: {}", method, endpoint, e))),
        }
    }
}
