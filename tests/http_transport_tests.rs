//! HTTP transport integration tests against an in-process axum backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use timeclock::api::{ApiGateway, HttpTransport, Method};
use timeclock::config::FallbackMode;
use timeclock::identity::token::encode_unsigned;
use timeclock::identity::{GatewayAuthProvider, Role, SessionManager};
use timeclock::storage::MemoryStore;

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] != "pw" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid credentials"})));
    }
    let token = encode_unsigned(chrono::Utc::now() + chrono::Duration::hours(1), "7");
    (
        StatusCode::OK,
        Json(json!({
            "token": token,
            "refreshToken": "r-1",
            "user": {"id": 7, "name": "Gia", "email": body["email"], "role": "general_manager"}
        })),
    )
}

async fn refresh(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["refresh_token"] != "r-1" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "refresh token revoked"})));
    }
    let token = encode_unsigned(chrono::Utc::now() + chrono::Duration::hours(2), "7");
    (StatusCode::OK, Json(json!({"token": token, "refreshToken": "r-2"})))
}

async fn users(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false);
    if !bearer {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "missing token"})));
    }
    (StatusCode::OK, Json(json!({"data": [{"id": 7, "role": "general_manager"}, {"id": 8, "role": "employee"}]})))
}

async fn update_working_time(Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    let mut record = body["working_time"].clone();
    record["id"] = json!(id);
    Json(json!({ "data": record }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({"data": []}))
}

async fn broken() -> (StatusCode, &'static str) { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }

async fn spawn_backend() -> Result<(String, tokio::task::JoinHandle<()>)> {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/users", get(users))
        .route("/api/workingtimes/{id}", put(update_working_time))
        .route("/api/slow", get(slow))
        .route("/api/broken", get(broken));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{}/api", addr), handle))
}

fn gateway(base: &str, mode: FallbackMode, timeout: Duration) -> Result<Arc<ApiGateway>> {
    Ok(Arc::new(ApiGateway::new(Arc::new(HttpTransport::new(base, timeout)?), mode)))
}

fn session_over(gateway: Arc<ApiGateway>) -> SessionManager {
    let provider = Arc::new(GatewayAuthProvider::new(gateway.clone()));
    SessionManager::new(provider, gateway, Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn login_refresh_and_bearer_calls_over_http() -> Result<()> {
    let (base, server) = spawn_backend().await?;
    let gw = gateway(&base, FallbackMode::Strict, Duration::from_secs(5))?;
    let session = session_over(gw.clone());
    session.boot().await;

    let e = session.login("gia@corp.com", "wrong").await.unwrap_err();
    assert_eq!(e.code_str(), "invalid_credentials");

    let unauth = gw.get_users(&[]).await.unwrap_err();
    assert_eq!(unauth.http_status(), Some(401));

    let user = session.login("gia@corp.com", "pw").await?;
    assert_eq!(user.role, Role::Gm);
    assert_eq!(user.id, "7");

    let users = gw.get_users(&[]).await?;
    assert!(users.is_live());
    assert_eq!(users.data().and_then(|d| d.as_array()).map(|a| a.len()), Some(2));

    session.refresh_now().await?;
    assert_eq!(session.snapshot().refresh_token.as_deref(), Some("r-2"));

    // the backend only honours the first refresh token
    let e = session.refresh_now().await.unwrap_err();
    assert!(e.is_auth_fatal());
    assert!(!session.snapshot().is_authenticated);
    assert_eq!(gw.auth_token(), None);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn path_parameters_and_bodies_round_trip() -> Result<()> {
    let (base, server) = spawn_backend().await?;
    let gw = gateway(&base, FallbackMode::Strict, Duration::from_secs(5))?;
    let resp = gw.update_working_time("10", &json!({"end_time": "2026-10-19T17:00:00"})).await?;
    assert!(resp.is_live());
    assert_eq!(resp.json()["data"]["id"], "10");
    assert_eq!(resp.json()["data"]["end_time"], "2026-10-19T17:00:00");
    server.abort();
    Ok(())
}

#[tokio::test]
async fn strict_mode_surfaces_timeouts_and_server_errors() -> Result<()> {
    let (base, server) = spawn_backend().await?;
    let gw = gateway(&base, FallbackMode::Strict, Duration::from_millis(300))?;

    let e = gw.request("/slow", Method::Get, None, &[]).await.unwrap_err();
    assert_eq!(e.code_str(), "timeout");

    let e = gw.request("/broken", Method::Get, None, &[]).await.unwrap_err();
    assert_eq!(e.http_status(), Some(500));
    assert_eq!(e.message(), "boom");
    server.abort();
    Ok(())
}

#[tokio::test]
async fn permissive_mode_substitutes_fallbacks() -> Result<()> {
    let (base, server) = spawn_backend().await?;
    let gw = gateway(&base, FallbackMode::Permissive, Duration::from_millis(300))?;

    let slow = gw.request("/slow", Method::Get, None, &[]).await?;
    assert!(slow.is_fallback());
    let broken = gw.request("/broken", Method::Get, None, &[]).await?;
    assert!(broken.is_fallback());
    server.abort();
    Ok(())
}

#[tokio::test]
async fn unreachable_backend() -> Result<()> {
    // grab a free port, then close it so nothing listens there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}/api", listener.local_addr()?);
    drop(listener);

    let strict = gateway(&base, FallbackMode::Strict, Duration::from_secs(2))?;
    let e = strict.get_users(&[]).await.unwrap_err();
    assert_eq!(e.code_str(), "network_unavailable");

    let permissive = gateway(&base, FallbackMode::Permissive, Duration::from_secs(2))?;
    let resp = permissive.get_users(&[]).await?;
    assert!(resp.is_fallback());
    assert_eq!(resp.data().and_then(|d| d.as_array()).map(|a| a.len()), Some(3));
    Ok(())
}
