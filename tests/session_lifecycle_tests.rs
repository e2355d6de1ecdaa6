//! Session lifecycle integration tests: persistence across restarts, demo mode
//! with the backend down, and the route guard in front of a booting session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tempfile::tempdir;

use timeclock::api::{ApiGateway, FakeReply, FakeTransport, Method};
use timeclock::config::FallbackMode;
use timeclock::identity::token::encode_unsigned;
use timeclock::identity::{
    GatewayAuthProvider, GuardDecision, Role, RouteGuard, RouteTable, SessionManager, SessionPhase,
};
use timeclock::storage::{FileStore, MemoryStore, SessionStore, AUTH_TOKEN_KEY, CURRENT_USER_KEY, REFRESH_TOKEN_KEY};

fn manager_over(fake: Arc<FakeTransport>, mode: FallbackMode, store: Arc<dyn SessionStore>) -> SessionManager {
    let gateway = Arc::new(ApiGateway::new(fake, mode));
    let provider = Arc::new(GatewayAuthProvider::new(gateway.clone()));
    SessionManager::new(provider, gateway, store)
}

fn access_for(secs: i64) -> String {
    encode_unsigned(chrono::Utc::now() + chrono::Duration::seconds(secs), "5")
}

fn login_reply(role: &str) -> FakeReply {
    FakeReply::ok(json!({
        "token": access_for(3600),
        "refreshToken": "r-1",
        "user": {"id": 5, "name": "Eve", "email": "eve@corp.com", "role": role}
    }))
}

#[tokio::test]
async fn file_backed_session_survives_restart() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("state").join("session.json");

    let fake = Arc::new(FakeTransport::new());
    fake.on(Method::Post, "/auth/login", login_reply("manager"));
    let first = manager_over(fake.clone(), FallbackMode::Strict, Arc::new(FileStore::open(&path)?));
    first.boot().await;
    first.login("eve@corp.com", "pw").await?;
    first.shutdown();
    drop(first);

    let second = manager_over(fake.clone(), FallbackMode::Strict, Arc::new(FileStore::open(&path)?));
    let snap = second.boot().await;
    assert!(snap.is_authenticated);
    assert_eq!(snap.user.map(|u| u.role), Some(Role::Manager));
    assert_eq!(fake.requests_to("/auth/login").len(), 1);

    second.logout();
    let third = FileStore::open(&path)?;
    assert_eq!(third.get(AUTH_TOKEN_KEY)?, None);
    Ok(())
}

#[tokio::test]
async fn demo_mode_signs_in_without_backend() -> Result<()> {
    let fake = Arc::new(FakeTransport::new());
    fake.set_down(true);
    let session = manager_over(fake.clone(), FallbackMode::Permissive, Arc::new(MemoryStore::new()));
    session.boot().await;

    let user = session.login("demo@corp.com", "anything").await?;
    assert_eq!(user.role, Role::Gm);
    assert_eq!(user.email, "demo@corp.com");
    // the demo token is far from expiry, so nothing is refreshed right away
    tokio::task::yield_now().await;
    assert_eq!(session.timer_stats().fired, 0);
    assert_eq!(fake.send_count(), 0);

    let users = session.gateway().get_users(&[]).await?;
    assert!(users.is_fallback());
    assert_eq!(users.data().and_then(|d| d.as_array()).map(|a| a.len()), Some(3));

    let guard = RouteGuard::new(session.clone());
    assert_eq!(guard.navigate(&RouteTable::standard(), "/").await, GuardDecision::RedirectToHome(Role::Gm));
    session.logout();
    Ok(())
}

#[tokio::test]
async fn guard_boots_and_routes_by_role() -> Result<()> {
    let store = MemoryStore::new();
    store.set(AUTH_TOKEN_KEY, &access_for(3600))?;
    store.set(REFRESH_TOKEN_KEY, "r-1")?;
    store.set(CURRENT_USER_KEY, r#"{"id":"5","name":"Eve","email":"eve@corp.com","role":"employee"}"#)?;
    let session = manager_over(Arc::new(FakeTransport::new()), FallbackMode::Strict, Arc::new(store));
    let guard = RouteGuard::new(session.clone());
    let table = RouteTable::standard();

    assert_eq!(session.snapshot().phase, SessionPhase::Uninitialized);
    assert_eq!(guard.navigate(&table, "/gm/users").await, GuardDecision::RedirectToHome(Role::Employee));
    assert!(session.snapshot().initialized);
    assert_eq!(guard.navigate(&table, "/employee/logs").await, GuardDecision::Allow);
    assert_eq!(guard.navigate(&table, "/login").await, GuardDecision::RedirectToHome(Role::Employee));
    assert_eq!(
        GuardDecision::RedirectToHome(Role::Employee).redirect_path().as_deref(),
        Some("/employee")
    );

    session.logout();
    assert_eq!(guard.navigate(&table, "/employee").await, GuardDecision::RedirectToLogin);
    assert_eq!(guard.navigate(&table, "/login").await, GuardDecision::Allow);
    assert_eq!(guard.navigate(&table, "/").await, GuardDecision::Allow);
    assert_eq!(guard.navigate(&table, "/unknown").await, GuardDecision::RedirectToLogin);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn guards_racing_a_slow_restore_share_one_refresh() -> Result<()> {
    let store = MemoryStore::new();
    store.set(AUTH_TOKEN_KEY, &access_for(-30))?;
    store.set(REFRESH_TOKEN_KEY, "r-old")?;
    store.set(CURRENT_USER_KEY, r#"{"id":"5","name":"Max","role":"general_manager"}"#)?;
    let fake = Arc::new(FakeTransport::new());
    fake.on(
        Method::Post,
        "/auth/refresh",
        FakeReply::ok(json!({"token": access_for(3600), "refreshToken": "r-new"})).after(Duration::from_secs(1)),
    );
    let session = manager_over(fake.clone(), FallbackMode::Strict, Arc::new(store));

    let a = RouteGuard::new(session.clone());
    let b = RouteGuard::new(session.clone());
    let table = RouteTable::standard();
    let (da, db) = tokio::join!(a.navigate(&table, "/gm"), b.navigate(&table, "/manager"));
    assert_eq!(da, GuardDecision::Allow);
    assert_eq!(db, GuardDecision::RedirectToHome(Role::Gm));
    assert_eq!(fake.requests_to("/auth/refresh").len(), 1);
    session.logout();
    Ok(())
}
