//!
//! timeclock session manager
//! -------------------------
//! Owns the client's authentication state and is the only writer of the persisted
//! authentication record. Lifecycle:
//!
//!   Uninitialized -> Restoring -> Authenticated(Stable) | Unauthenticated
//!   Restoring --expired access token--> Authenticated(Refreshing)
//!   Unauthenticated --login--> Authenticated(Stable)
//!   Authenticated(Stable) --timer/refresh_now--> Authenticated(Refreshing)
//!   Authenticated(Refreshing) --ok--> Authenticated(Stable) | --err--> Unauthenticated
//!   any --logout--> Unauthenticated
//!
//! Refresh is driven by one single-shot timer per access token, armed to fire at
//! expiry minus the grace window and replaced on every rotation. Every state
//! change that invalidates in-flight work (login, logout, forced logout) bumps a
//! generation counter; a login or refresh result that comes back under a newer
//! generation is dropped instead of applied.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::principal::{Role, User};
use super::provider::{AuthProvider, GatewayAuthProvider, LoginRequest};
use super::token;
use crate::api::ApiGateway;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::storage::{self, PersistedSession, SessionStore};
use crate::tprintln;

/// Lower bound on the delay of a timer armed after a rotation, so a backend
/// issuing tokens shorter than the grace window cannot spin the refresh loop.
/// Never pushes the timer past the token's own expiry.
const MIN_REARM: Duration = Duration::from_secs(30);
/// Delay before a timer that found another refresh running tries again.
const BUSY_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Stable,
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Restoring,
    Authenticated(RefreshState),
    Unauthenticated,
}

/// Snapshot of the authentication state published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub initialized: bool,
    pub phase: SessionPhase,
    /// Message of the last failed login, cleared on the next attempt.
    pub error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            user: None,
            is_authenticated: false,
            initialized: false,
            phase: SessionPhase::Uninitialized,
            error: None,
        }
    }
}

impl Session {
    pub fn role(&self) -> Option<Role> {
        if !self.is_authenticated {
            return None;
        }
        self.user.as_ref().map(|u| u.role)
    }

    pub fn is_refreshing(&self) -> bool {
        self.phase == SessionPhase::Authenticated(RefreshState::Refreshing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    LoggedIn(User),
    LoginFailed(AppError),
    RefreshStarted,
    RefreshSucceeded,
    RefreshFailed(AppError),
    /// A login or refresh finished after the session had moved on.
    StaleDiscarded { operation: &'static str },
    LoggedOut(LogoutReason),
}

/// Refresh timer bookkeeping. A timer that fires is counted in `fired`, never in
/// `cancelled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub armed: u64,
    pub cancelled: u64,
    pub fired: u64,
}

struct ArmedTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    provider: Arc<dyn AuthProvider>,
    gateway: Arc<ApiGateway>,
    store: Arc<dyn SessionStore>,
    grace: Duration,
    state: watch::Sender<Session>,
    events: broadcast::Sender<SessionEvent>,
    // serializes boot and login
    ops: tokio::sync::Mutex<()>,
    // held while checking the generation and applying a result
    commit: Mutex<()>,
    generation: AtomicU64,
    refreshing: AtomicBool,
    timer: Mutex<Option<ArmedTimer>>,
    timer_seq: AtomicU64,
    stats: Mutex<TimerStats>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(t) = self.timer.get_mut().take() {
            t.handle.abort();
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn AuthProvider>, gateway: Arc<ApiGateway>, store: Arc<dyn SessionStore>) -> Self {
        Self::with_grace(provider, gateway, store, token::REFRESH_GRACE)
    }

    pub fn with_grace(
        provider: Arc<dyn AuthProvider>,
        gateway: Arc<ApiGateway>,
        store: Arc<dyn SessionStore>,
        grace: Duration,
    ) -> Self {
        let (state, _) = watch::channel(Session::default());
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                provider,
                gateway,
                store,
                grace,
                state,
                events,
                ops: tokio::sync::Mutex::new(()),
                commit: Mutex::new(()),
                generation: AtomicU64::new(0),
                refreshing: AtomicBool::new(false),
                timer: Mutex::new(None),
                timer_seq: AtomicU64::new(0),
                stats: Mutex::new(TimerStats::default()),
            }),
        }
    }

    /// Manager talking to the backend through `gateway`'s auth endpoints.
    pub fn from_config(cfg: &AppConfig, gateway: Arc<ApiGateway>, store: Arc<dyn SessionStore>) -> Self {
        let provider = Arc::new(GatewayAuthProvider::new(gateway.clone()));
        Self::with_grace(provider, gateway, store, cfg.refresh_grace())
    }

    pub fn gateway(&self) -> &Arc<ApiGateway> { &self.inner.gateway }

    pub fn snapshot(&self) -> Session { Session::clone(&self.inner.state.borrow()) }

    pub fn subscribe(&self) -> watch::Receiver<Session> { self.inner.state.subscribe() }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> { self.inner.events.subscribe() }

    /// Resolves once the boot decision has been made.
    pub async fn wait_initialized(&self) -> Session {
        let mut rx = self.inner.state.subscribe();
        let ready = rx.wait_for(|s| s.initialized).await.map(|s| Session::clone(&s));
        match ready {
            Ok(s) => s,
            Err(_) => self.snapshot(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool { self.snapshot().role() == Some(role) }

    pub fn display_name(&self) -> String {
        match self.snapshot().user {
            Some(u) if !u.name.is_empty() => u.name,
            _ => "User".to_string(),
        }
    }

    pub fn role_display(&self) -> &'static str {
        self.snapshot().role().map(|r| r.display_name()).unwrap_or("Unknown")
    }

    pub fn timer_stats(&self) -> TimerStats { *self.inner.stats.lock() }

    pub fn refresh_in_flight(&self) -> bool { self.inner.refreshing.load(Ordering::Acquire) }

    fn emit(&self, ev: SessionEvent) {
        // no receivers is fine
        let _ = self.inner.events.send(ev);
    }

    fn update<F: FnOnce(&mut Session)>(&self, f: F) {
        let mut change = None;
        self.inner.state.send_modify(|s| {
            let from = s.phase;
            f(s);
            if s.phase != from {
                change = Some((from, s.phase));
            }
        });
        if let Some((from, to)) = change {
            debug!(target: "timeclock::session", "phase {:?} -> {:?}", from, to);
            self.emit(SessionEvent::PhaseChanged { from, to });
        }
    }

    /// Restore the persisted session. Runs once; later calls return the current
    /// snapshot.
    pub async fn boot(&self) -> Session {
        let _op = self.inner.ops.lock().await;
        if self.snapshot().phase != SessionPhase::Uninitialized {
            return self.snapshot();
        }
        self.update(|s| s.phase = SessionPhase::Restoring);
        if let Err(e) = self.restore().await {
            warn!(target: "timeclock::session", "session restore failed: {}", e);
            let _c = self.inner.commit.lock();
            self.clear_locked(None);
        }
        self.update(|s| {
            s.initialized = true;
            if s.phase == SessionPhase::Restoring {
                s.phase = SessionPhase::Unauthenticated;
            }
        });
        let snap = self.snapshot();
        info!(
            target: "timeclock::session",
            "session initialized: authenticated={} role={}",
            snap.is_authenticated,
            snap.role().map(|r| r.as_str()).unwrap_or("-")
        );
        snap
    }

    async fn restore(&self) -> AppResult<()> {
        let Some(record) = storage::load_session(self.inner.store.as_ref())? else {
            debug!(target: "timeclock::session", "no persisted session");
            return Ok(());
        };
        let parsed = serde_json::from_str::<serde_json::Value>(&record.user_json)
            .map_err(AppError::from)
            .and_then(|v| User::from_json(&v));
        let user = match parsed {
            Ok(u) => u,
            Err(e) => {
                warn!(target: "timeclock::session", "discarding persisted session with unreadable user: {}", e);
                let _c = self.inner.commit.lock();
                self.clear_locked(None);
                return Ok(());
            }
        };
        if !token::is_expired(&record.access_token) {
            info!(target: "timeclock::session", "restored session for {} ({})", user.email, user.role);
            let _c = self.inner.commit.lock();
            self.establish(record.access_token, record.refresh_token, user, Duration::ZERO);
            return Ok(());
        }
        info!(target: "timeclock::session", "persisted access token expired, refreshing");
        self.update(|s| {
            s.refresh_token = Some(record.refresh_token);
            s.user = Some(user);
        });
        // failure already cleared the session
        let _ = self.refresh_inner().await;
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<User> {
        let _op = self.inner.ops.lock().await;
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.update(|s| s.error = None);
        let req = LoginRequest { email: email.to_string(), password: password.to_string() };
        let result = self.inner.provider.login(&req).await;

        let _c = self.inner.commit.lock();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            info!(target: "timeclock::session", "login for {} superseded, result dropped", email);
            self.emit(SessionEvent::StaleDiscarded { operation: "login" });
            return Err(AppError::conflict("superseded", "login superseded by logout"));
        }
        match result {
            Err(e) => {
                warn!(target: "timeclock::session", "login failed for {}: {}", email, e);
                let msg = e.message().to_string();
                self.update(|s| s.error = Some(msg));
                self.emit(SessionEvent::LoginFailed(e.clone()));
                Err(e)
            }
            Ok(resp) => {
                let record = PersistedSession {
                    access_token: resp.token.clone(),
                    refresh_token: resp.refresh_token.clone(),
                    user_json: serde_json::to_string(&resp.user)?,
                };
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = storage::save_session(self.inner.store.as_ref(), &record) {
                    warn!(target: "timeclock::session", "could not persist session: {}", e);
                }
                let user = resp.user;
                self.establish(resp.token, resp.refresh_token, user.clone(), Duration::ZERO);
                info!(target: "timeclock::session", "logged in {} as {} ({:?})", user.email, user.role, resp.source);
                tprintln!("session.login user={} role={}", user.id, user.role);
                self.emit(SessionEvent::LoggedIn(user.clone()));
                Ok(user)
            }
        }
    }

    /// Rotate the token pair now. Fails with `refresh_in_flight` while another
    /// refresh runs.
    pub async fn refresh_now(&self) -> AppResult<()> { self.refresh_inner().await }

    async fn refresh_inner(&self) -> AppResult<()> {
        let Some(_flight) = InFlight::acquire(&self.inner.refreshing) else {
            debug!(target: "timeclock::session", "refresh requested while one is running");
            return Err(AppError::conflict("refresh_in_flight", "a token refresh is already running"));
        };
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let Some(refresh_token) = self.snapshot().refresh_token else {
            return Err(AppError::auth("not_authenticated", "no refresh token"));
        };
        self.update(|s| {
            if matches!(s.phase, SessionPhase::Authenticated(_) | SessionPhase::Restoring) {
                s.phase = SessionPhase::Authenticated(RefreshState::Refreshing);
            }
        });
        self.emit(SessionEvent::RefreshStarted);
        let result = self.inner.provider.refresh(&refresh_token).await;

        let _c = self.inner.commit.lock();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            info!(target: "timeclock::session", "refresh result dropped, session changed while it ran");
            self.emit(SessionEvent::StaleDiscarded { operation: "refresh" });
            return Err(AppError::conflict("superseded", "refresh superseded"));
        }
        match result {
            Ok(pair) if token::is_expired(&pair.token) => {
                let e = AppError::auth("refresh_rejected", "refreshed access token is already expired");
                warn!(target: "timeclock::session", "token refresh returned an expired token, logging out");
                self.emit(SessionEvent::RefreshFailed(e.clone()));
                self.clear_locked(Some(LogoutReason::RefreshFailed));
                Err(e)
            }
            Ok(pair) => {
                let Some(user) = self.snapshot().user else {
                    self.clear_locked(Some(LogoutReason::RefreshFailed));
                    return Err(AppError::auth("not_authenticated", "no user for refreshed session"));
                };
                if let Err(e) = storage::save_tokens(self.inner.store.as_ref(), &pair.token, &pair.refresh_token) {
                    warn!(target: "timeclock::session", "could not persist rotated tokens: {}", e);
                }
                self.establish(pair.token, pair.refresh_token, user, MIN_REARM);
                info!(target: "timeclock::session", "tokens rotated ({:?})", pair.source);
                self.emit(SessionEvent::RefreshSucceeded);
                Ok(())
            }
            Err(e) => {
                warn!(target: "timeclock::session", "token refresh failed, logging out: {}", e);
                self.emit(SessionEvent::RefreshFailed(e.clone()));
                self.clear_locked(Some(LogoutReason::RefreshFailed));
                Err(e)
            }
        }
    }

    /// Access token that has not expired yet. An expired one is refreshed first;
    /// when a refresh is already running its outcome is awaited instead.
    pub async fn fresh_access_token(&self) -> AppResult<String> {
        let snap = self.snapshot();
        if !snap.is_authenticated && !snap.is_refreshing() {
            return Err(AppError::auth("not_authenticated", "No user logged in"));
        }
        if let Some(t) = snap.access_token.filter(|t| !token::is_expired(t)) {
            return Ok(t);
        }
        debug!(target: "timeclock::session", "access token expired before use, refreshing");
        match self.refresh_inner().await {
            Ok(()) => {}
            Err(e) if e.is_code("refresh_in_flight") => {
                let mut rx = self.inner.state.subscribe();
                // sender lives in `inner`, so this only ends when the refresh settles
                let _ = rx.wait_for(|s| !s.is_refreshing()).await;
            }
            Err(e) => return Err(e),
        }
        let snap = self.snapshot();
        match snap.access_token {
            Some(t) if snap.is_authenticated && !token::is_expired(&t) => Ok(t),
            _ => Err(AppError::auth("not_authenticated", "session ended while refreshing")),
        }
    }

    /// Clear the session. Safe in any state and idempotent; the refresh timer is
    /// cancelled before this returns.
    pub fn logout(&self) {
        let _c = self.inner.commit.lock();
        let had_session = {
            let s = self.inner.state.borrow();
            s.is_authenticated || s.refresh_token.is_some()
        };
        self.clear_locked(had_session.then_some(LogoutReason::UserRequested));
        if had_session {
            info!(target: "timeclock::session", "logged out");
        }
    }

    /// Stop the refresh timer without touching the session.
    pub fn shutdown(&self) { self.cancel_timer(); }

    // caller holds `commit`
    fn establish(&self, access: String, refresh: String, user: User, floor: Duration) {
        self.inner.gateway.set_auth_token(&access);
        let delay = match token::remaining(&access) {
            Some(left) => left.saturating_sub(self.inner.grace).max(floor.min(left)),
            None => Duration::ZERO,
        };
        self.update(move |s| {
            s.access_token = Some(access);
            s.refresh_token = Some(refresh);
            s.user = Some(user);
            s.is_authenticated = true;
            s.initialized = true;
            s.phase = SessionPhase::Authenticated(RefreshState::Stable);
            s.error = None;
        });
        self.arm_after(delay);
    }

    // caller holds `commit`
    fn clear_locked(&self, reason: Option<LogoutReason>) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_timer();
        self.inner.gateway.clear_auth_token();
        if let Err(e) = storage::clear_session(self.inner.store.as_ref()) {
            warn!(target: "timeclock::session", "could not clear persisted session: {}", e);
        }
        self.update(|s| {
            s.access_token = None;
            s.refresh_token = None;
            s.user = None;
            s.is_authenticated = false;
            s.phase = SessionPhase::Unauthenticated;
            s.initialized = true;
        });
        if let Some(r) = reason {
            self.emit(SessionEvent::LoggedOut(r));
        }
    }

    fn arm_after(&self, delay: Duration) {
        let id = self.inner.timer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        // slot stays locked until the entry is stored, so a zero-delay task
        // cannot look for its id too early
        let mut slot = self.inner.timer.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SessionManager { inner }.on_timer_fired(id).await;
            }
        });
        let previous = slot.replace(ArmedTimer { id, handle });
        drop(slot);
        let mut stats = self.inner.stats.lock();
        stats.armed += 1;
        if let Some(p) = previous {
            p.handle.abort();
            stats.cancelled += 1;
        }
        debug!(target: "timeclock::session", "refresh timer #{} armed, fires in {}s", id, delay.as_secs());
    }

    fn cancel_timer(&self) {
        let armed = self.inner.timer.lock().take();
        if let Some(t) = armed {
            t.handle.abort();
            self.inner.stats.lock().cancelled += 1;
            debug!(target: "timeclock::session", "refresh timer #{} cancelled", t.id);
        }
    }

    async fn on_timer_fired(&self, id: u64) {
        {
            let mut slot = self.inner.timer.lock();
            if slot.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            // detaches this task's own handle
            slot.take();
        }
        self.inner.stats.lock().fired += 1;
        if !self.snapshot().is_authenticated {
            return;
        }
        debug!(target: "timeclock::session", "refresh timer #{} fired", id);
        if let Err(e) = self.refresh_inner().await {
            // the running refresh re-arms on success
            if e.is_code("refresh_in_flight") && self.inner.timer.lock().is_none() {
                self.arm_after(BUSY_RETRY);
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
