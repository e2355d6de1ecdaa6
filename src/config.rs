//! Client configuration: defaults, an optional JSON file, then environment
//! overrides (`TIMECLOCK_*`), in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::identity::REFRESH_GRACE;

/// How the gateway reacts when the backend cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Substitute synthetic payloads so the UI stays demoable.
    Permissive,
    /// Propagate failures to the caller.
    Strict,
}

impl FallbackMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" | "demo" | "dev" | "true" | "1" => Some(FallbackMode::Permissive),
            "strict" | "prod" | "false" | "0" => Some(FallbackMode::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Base URL of the REST API, including the `/api` prefix.
    #[serde(default = "AppConfig::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "AppConfig::default_fallback")]
    pub fallback: FallbackMode,
    /// Probe backend availability before each permissive-mode request.
    #[serde(default = "AppConfig::default_probe")]
    pub probe_backend: bool,
    #[serde(default = "AppConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Refresh this long before the access token expires.
    #[serde(default = "AppConfig::default_refresh_grace_secs")]
    pub refresh_grace_secs: u64,
    /// Where the demo binary keeps the session between runs.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

impl AppConfig {
    fn default_api_base_url() -> String { "http://localhost:4000/api".to_string() }
    fn default_fallback() -> FallbackMode { FallbackMode::Strict }
    fn default_probe() -> bool { true }
    fn default_request_timeout_ms() -> u64 { 10_000 }
    fn default_refresh_grace_secs() -> u64 { REFRESH_GRACE.as_secs() }

    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }

    pub fn refresh_grace(&self) -> Duration { Duration::from_secs(self.refresh_grace_secs) }

    /// Load from `path` when given and readable, else defaults; then apply env.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let bytes = std::fs::read(p)?;
                serde_json::from_slice::<AppConfig>(&bytes)?
            }
            _ => AppConfig::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// Apply overrides from `lookup`; malformed values are logged and ignored.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("TIMECLOCK_API_URL") {
            self.api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("TIMECLOCK_FALLBACK") {
            match FallbackMode::parse(&v) {
                Some(m) => self.fallback = m,
                None => warn!(target: "timeclock::config", "ignoring TIMECLOCK_FALLBACK='{}'", v),
            }
        }
        if let Some(v) = lookup("TIMECLOCK_PROBE") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.probe_backend = true,
                "0" | "false" | "no" => self.probe_backend = false,
                _ => warn!(target: "timeclock::config", "ignoring TIMECLOCK_PROBE='{}'", v),
            }
        }
        if let Some(v) = lookup("TIMECLOCK_REQUEST_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.request_timeout_ms = ms,
                _ => warn!(target: "timeclock::config", "ignoring TIMECLOCK_REQUEST_TIMEOUT_MS='{}'", v),
            }
        }
        if let Some(v) = lookup("TIMECLOCK_REFRESH_GRACE_SECS") {
            match v.trim().parse::<u64>() {
                Ok(s) => self.refresh_grace_secs = s,
                Err(_) => warn!(target: "timeclock::config", "ignoring TIMECLOCK_REFRESH_GRACE_SECS='{}'", v),
            }
        }
        if let Some(v) = lookup("TIMECLOCK_SESSION_FILE") {
            if !v.trim().is_empty() {
                self.session_file = Some(PathBuf::from(v));
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: Self::default_api_base_url(),
            fallback: Self::default_fallback(),
            probe_backend: Self::default_probe(),
            request_timeout_ms: Self::default_request_timeout_ms(),
            refresh_grace_secs: Self::default_refresh_grace_secs(),
            session_file: None,
        }
    }
}
