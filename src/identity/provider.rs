use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::principal::User;
use crate::api::{ApiGateway, ApiResponse, ResponseSource};
use crate::error::{AppError, AppResult};
use crate::tprintln;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
    pub source: ResponseSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    pub source: ResponseSource,
}

/// Backend operations the session manager depends on.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse>;
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair>;
}

/// `AuthProvider` over the API gateway's `/auth/*` endpoints.
pub struct GatewayAuthProvider {
    gateway: Arc<ApiGateway>,
}

impl GatewayAuthProvider {
    pub fn new(gateway: Arc<ApiGateway>) -> Self { Self { gateway } }
}

fn non_empty_str(resp: &ApiResponse, key: &str) -> Option<String> {
    resp.json()
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl AuthProvider for GatewayAuthProvider {
    async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        let resp = self.gateway.authenticate_user(&req.email, &req.password).await?;
        let (Some(token), Some(refresh_token)) = (non_empty_str(&resp, "token"), non_empty_str(&resp, "refreshToken")) else {
            return Err(AppError::invalid_response("Invalid response from server"));
        };
        let user_v = resp
            .json()
            .get("user")
            .ok_or_else(|| AppError::invalid_response("Invalid response from server"))?;
        let user = User::from_json(user_v)?;
        tprintln!("auth.login email={} role={} source={:?}", req.email, user.role, resp.source);
        Ok(LoginResponse { token, refresh_token, user, source: resp.source })
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let resp = self.gateway.refresh_with_token(refresh_token).await?;
        match (non_empty_str(&resp, "token"), non_empty_str(&resp, "refreshToken")) {
            (Some(token), Some(refresh_token)) => Ok(TokenPair { token, refresh_token, source: resp.source }),
            _ => Err(AppError::auth("refresh_rejected", "Invalid refresh response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FakeReply, FakeTransport, Method};
    use crate::config::FallbackMode;
    use crate::identity::Role;
    use serde_json::json;

    fn provider() -> (Arc<FakeTransport>, GatewayAuthProvider) {
        let fake = Arc::new(FakeTransport::new());
        let gw = Arc::new(ApiGateway::new(fake.clone(), FallbackMode::Strict));
        (fake, GatewayAuthProvider::new(gw))
    }

    fn creds() -> LoginRequest {
        LoginRequest { email: "a@b.com".into(), password: "x".into() }
    }

    #[tokio::test]
    async fn login_normalizes_role() {
        let (fake, p) = provider();
        fake.on(Method::Post, "/auth/login", FakeReply::ok(json!({
            "token": "t.t.t", "refreshToken": "r1",
            "user": {"id": 7, "name": "Gia", "email": "a@b.com", "role": "general_manager", "department": "HQ"}
        })));
        let r = p.login(&creds()).await.unwrap();
        assert_eq!(r.user.role, Role::Gm);
        assert_eq!(r.user.id, "7");
        assert_eq!(r.refresh_token, "r1");
        assert_eq!(r.source, ResponseSource::Live);
    }

    #[tokio::test]
    async fn login_without_tokens_is_invalid() {
        let (fake, p) = provider();
        fake.on(Method::Post, "/auth/login", FakeReply::ok(json!({"token": "t", "user": {"id": 1, "role": "employee"}})));
        let e = p.login(&creds()).await.unwrap_err();
        assert_eq!(e.code_str(), "invalid_response");
    }

    #[tokio::test]
    async fn refresh_missing_rotation_is_rejected() {
        let (fake, p) = provider();
        fake.on(Method::Post, "/auth/refresh", FakeReply::ok(json!({"token": "only-access"})));
        let e = p.refresh("r1").await.unwrap_err();
        assert!(e.is_auth_fatal());
    }
}
