//! Typed wrappers for the REST endpoints the dashboard consumes.

use serde_json::{json, Value};

use super::{ApiGateway, ApiResponse, Method};
use crate::error::AppResult;

/// Append `params` as an URL-encoded query string.
pub fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let qs = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, qs)
}

fn seg(id: &str) -> String { urlencoding::encode(id).into_owned() }

impl ApiGateway {
    async fn get(&self, endpoint: &str) -> AppResult<ApiResponse> {
        self.request(endpoint, Method::Get, None, &[]).await
    }

    async fn send_json(&self, endpoint: &str, method: Method, body: Value) -> AppResult<ApiResponse> {
        self.request(endpoint, method, Some(body), &[]).await
    }

    // --- auth ---

    pub async fn authenticate_user(&self, email: &str, password: &str) -> AppResult<ApiResponse> {
        self.send_json("/auth/login", Method::Post, json!({ "email": email, "password": password })).await
    }

    pub async fn refresh_with_token(&self, refresh_token: &str) -> AppResult<ApiResponse> {
        self.send_json("/auth/refresh", Method::Post, json!({ "refresh_token": refresh_token })).await
    }

    pub async fn logout_user(&self) -> AppResult<ApiResponse> {
        self.request("/auth/logout", Method::Post, None, &[]).await
    }

    pub async fn current_user(&self) -> AppResult<ApiResponse> {
        self.get("/auth/profile").await
    }

    // --- users ---

    pub async fn get_users(&self, params: &[(&str, &str)]) -> AppResult<ApiResponse> {
        self.get(&with_query("/users", params)).await
    }

    pub async fn get_user(&self, id: &str) -> AppResult<ApiResponse> {
        self.get(&format!("/users/{}", seg(id))).await
    }

    pub async fn create_user(&self, user: &Value) -> AppResult<ApiResponse> {
        self.send_json("/users", Method::Post, json!({ "user": user })).await
    }

    pub async fn update_user(&self, id: &str, user: &Value) -> AppResult<ApiResponse> {
        self.send_json(&format!("/users/{}", seg(id)), Method::Put, json!({ "user": user })).await
    }

    pub async fn delete_user(&self, id: &str) -> AppResult<ApiResponse> {
        self.request(&format!("/users/{}", seg(id)), Method::Delete, None, &[]).await
    }

    pub async fn dashboard_stats(&self) -> AppResult<ApiResponse> {
        self.get("/dashboard/stats").await
    }

    // --- working times ---

    pub async fn get_working_times(&self, params: &[(&str, &str)]) -> AppResult<ApiResponse> {
        self.get(&with_query("/workingtimes", params)).await
    }

    pub async fn get_working_time(&self, id: &str) -> AppResult<ApiResponse> {
        self.get(&format!("/workingtimes/{}", seg(id))).await
    }

    pub async fn create_working_time(&self, working_time: &Value) -> AppResult<ApiResponse> {
        self.send_json("/workingtimes", Method::Post, json!({ "working_time": working_time })).await
    }

    pub async fn update_working_time(&self, id: &str, working_time: &Value) -> AppResult<ApiResponse> {
        self.send_json(&format!("/workingtimes/{}", seg(id)), Method::Put, json!({ "working_time": working_time })).await
    }

    pub async fn delete_working_time(&self, id: &str) -> AppResult<ApiResponse> {
        self.request(&format!("/workingtimes/{}", seg(id)), Method::Delete, None, &[]).await
    }

    pub async fn today_working_times(&self, user_id: &str) -> AppResult<ApiResponse> {
        self.get(&format!("/workingtimes/today/{}", seg(user_id))).await
    }

    pub async fn working_time_stats(&self, user_id: &str) -> AppResult<ApiResponse> {
        self.get(&format!("/workingtimes/stats/{}", seg(user_id))).await
    }
}
