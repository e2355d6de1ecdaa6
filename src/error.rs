//! Unified client error model.
//! Every fallible operation in the crate returns `AppResult<T>`; the `code` of each
//! variant is a stable machine-readable string front-ends can match on, the
//! `message` is for humans.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Network { code: String, message: String },
    Http { code: String, message: String, status: u16 },
    Auth { code: String, message: String },
    Token { code: String, message: String },
    Conflict { code: String, message: String },
    UserInput { code: String, message: String },
    InvalidResponse { code: String, message: String },
    Storage { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Network { code, .. }
            | AppError::Http { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Token { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::InvalidResponse { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Network { message, .. }
            | AppError::Http { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Token { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::InvalidResponse { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn network<S: Into<String>>(code: S, msg: S) -> Self { AppError::Network { code: code.into(), message: msg.into() } }
    pub fn http<S: Into<String>>(status: u16, msg: S) -> Self { AppError::Http { code: "http_error".into(), message: msg.into(), status } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn token<S: Into<String>>(code: S, msg: S) -> Self { AppError::Token { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn invalid_response<S: Into<String>>(msg: S) -> Self { AppError::InvalidResponse { code: "invalid_response".into(), message: msg.into() } }
    pub fn storage<S: Into<String>>(code: S, msg: S) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Status carried by a strict-mode HTTP failure, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AppError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the failure means the stored credentials can no longer be used
    /// and the session has to be torn down.
    pub fn is_auth_fatal(&self) -> bool {
        matches!(self, AppError::Auth { code, .. } if code == "refresh_rejected")
    }

    pub fn is_code(&self, code: &str) -> bool { self.code_str() == code }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Http { status, .. } => write!(f, "{} ({}): {}", self.code_str(), status, self.message()),
            _ => write!(f, "{}: {}", self.code_str(), self.message()),
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: anything not classified at its origin is internal
        AppError::Internal { code: "internal".into(), message: format!("{:#}", err) }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::invalid_response(err.to_string())
    }
}

impl From<crate::identity::TokenError> for AppError {
    fn from(err: crate::identity::TokenError) -> Self {
        AppError::token("malformed_token".to_string(), err.to_string())
    }
}
