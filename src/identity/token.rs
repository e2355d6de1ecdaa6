//! Bearer-token inspection. The client holds no signing key, so nothing here
//! verifies a signature: the payload segment is decoded only to read `exp`.
//! Anything that cannot be decoded counts as expired.

use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Window before hard expiry in which a token is proactively refreshed.
pub const REFRESH_GRACE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has {0} segments, expected 3")]
    Segments(usize),
    #[error("payload is not valid base64")]
    Base64,
    #[error("payload is not a JSON object")]
    Json,
    #[error("payload has no numeric exp claim")]
    MissingExp,
    #[error("exp claim out of range")]
    ExpRange,
}

fn decode_segment(seg: &str) -> Result<Vec<u8>, TokenError> {
    let trimmed = seg.trim_end_matches('=');
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .map_err(|_| TokenError::Base64)
}

/// Decode the `exp` claim of `token`.
pub fn expires_at(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Segments(parts.len()));
    }
    let bytes = decode_segment(parts[1])?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| TokenError::Json)?;
    if !payload.is_object() {
        return Err(TokenError::Json);
    }
    let exp = payload.get("exp").and_then(|v| v.as_f64()).ok_or(TokenError::MissingExp)?;
    if !exp.is_finite() {
        return Err(TokenError::ExpRange);
    }
    let millis = (exp * 1000.0).floor() as i64;
    Utc.timestamp_millis_opt(millis).single().ok_or(TokenError::ExpRange)
}

/// Lifetime left at `now`; `None` once expired or when undecodable.
pub fn remaining_at(token: &str, now: DateTime<Utc>) -> Option<Duration> {
    let exp = expires_at(token).ok()?;
    (exp - now).to_std().ok().filter(|d| !d.is_zero())
}

pub fn remaining(token: &str) -> Option<Duration> {
    remaining_at(token, Utc::now())
}

pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Ok(exp) => exp <= now,
        Err(_) => true,
    }
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// True when less than `window` of lifetime is left. Malformed tokens need
/// replacing, so they report true as well.
pub fn expires_within_at(token: &str, window: Duration, now: DateTime<Utc>) -> bool {
    match remaining_at(token, now) {
        Some(left) => left < window,
        None => true,
    }
}

pub fn expires_within(token: &str, window: Duration) -> bool {
    expires_within_at(token, window, Utc::now())
}

/// Build an unsigned token carrying `exp`. Used for demo payloads.
pub fn encode_unsigned(exp: DateTime<Utc>, subject: &str) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({ "sub": subject, "exp": exp.timestamp() });
    let payload = engine.encode(claims.to_string().as_bytes());
    format!("{}.{}.", header, payload)
}
