//!
//! timeclock persistence adapter
//! -----------------------------
//! Durable key/value storage for the authentication record. The browser client this
//! crate serves keeps three string entries per tab (`authToken`, `refreshToken`,
//! `currentUser`), which survive a reload and vanish when the tab closes.
//!
//! Two backends implement `SessionStore`:
//! - `MemoryStore`: tab-lifetime storage. Clones share the same map, so a second
//!   `SessionManager` built over a clone behaves like the page after a reload.
//! - `FileStore`: a JSON document on disk, rewritten atomically on every change.
//!
//! Only the session manager writes the authentication keys; the helpers below are
//! the single place that knows their names.

use crate::error::AppResult;

pub mod kv;

pub use kv::{FileStore, MemoryStore};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const CURRENT_USER_KEY: &str = "currentUser";

const SESSION_KEYS: [&str; 3] = [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, CURRENT_USER_KEY];

/// String key/value store with tab (or file) lifetime.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
    fn keys(&self) -> AppResult<Vec<String>>;
}

/// Raw persisted authentication record. `user_json` is kept unparsed so the
/// session manager decides what a malformed user means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user_json: String,
}

/// Read the record; `None` unless all three entries are present and non-empty.
pub fn load_session(store: &dyn SessionStore) -> AppResult<Option<PersistedSession>> {
    let access = store.get(AUTH_TOKEN_KEY)?.filter(|s| !s.is_empty());
    let refresh = store.get(REFRESH_TOKEN_KEY)?.filter(|s| !s.is_empty());
    let user = store.get(CURRENT_USER_KEY)?.filter(|s| !s.is_empty());
    match (access, refresh, user) {
        (Some(access_token), Some(refresh_token), Some(user_json)) => {
            Ok(Some(PersistedSession { access_token, refresh_token, user_json }))
        }
        _ => Ok(None),
    }
}

pub fn save_session(store: &dyn SessionStore, record: &PersistedSession) -> AppResult<()> {
    store.set(AUTH_TOKEN_KEY, &record.access_token)?;
    store.set(REFRESH_TOKEN_KEY, &record.refresh_token)?;
    store.set(CURRENT_USER_KEY, &record.user_json)?;
    Ok(())
}

/// Rotate the two tokens, leaving the stored user untouched.
pub fn save_tokens(store: &dyn SessionStore, access_token: &str, refresh_token: &str) -> AppResult<()> {
    store.set(AUTH_TOKEN_KEY, access_token)?;
    store.set(REFRESH_TOKEN_KEY, refresh_token)?;
    Ok(())
}

/// Remove every authentication entry. Removal of absent keys is not an error.
pub fn clear_session(store: &dyn SessionStore) -> AppResult<()> {
    for k in SESSION_KEYS {
        store.remove(k)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
