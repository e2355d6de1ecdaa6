//! Synthetic responses for permissive mode. Every payload mirrors the live
//! backend's schema for the same (endpoint, method), so consumers never need to
//! know which one they got; `ApiResponse::source` is the only difference.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::{path_of, Method};
use crate::identity::token::encode_unsigned;

static USER_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/users/([^/]+)$").unwrap());
static WT_TODAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/workingtimes/today/([^/]+)$").unwrap());
static WT_STATS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/workingtimes/stats/([^/]+)$").unwrap());
static WT_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/workingtimes/([^/]+)$").unwrap());

const DEMO_TOKEN_TTL_HOURS: i64 = 1;

fn demo_users() -> Vec<Value> {
    vec![
        json!({"id": "1", "name": "Demo GM", "email": "demo@gm.com", "role": "general_manager", "department": "Management", "status": "online"}),
        json!({"id": "2", "name": "Demo Manager", "email": "demo@manager.com", "role": "manager", "department": "Operations", "status": "online"}),
        json!({"id": "3", "name": "Demo Employee", "email": "demo@employee.com", "role": "employee", "department": "Development", "status": "online"}),
    ]
}

fn stamp(t: DateTime<Utc>) -> String { t.format("%Y-%m-%dT%H:%M:%S").to_string() }

fn working_time(id: &str, user_id: &str, now: DateTime<Utc>, closed: bool) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "date": now.format("%Y-%m-%d").to_string(),
        "start_time": stamp(now),
        "end_time": if closed { Value::String(stamp(now)) } else { Value::Null },
        "break_start": Value::Null,
        "break_end": Value::Null,
        "status": if closed { "complete" } else { "active" },
    })
}

/// Overlay the object found under `key` in the request body onto `base`.
fn echo(mut base: Value, body: Option<&Value>, key: &str) -> Value {
    if let (Some(obj), Some(Value::Object(fields))) = (base.as_object_mut(), body.and_then(|b| b.get(key))) {
        for (k, v) in fields {
            if k != "id" {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    base
}

fn token_pair(now: DateTime<Utc>) -> (String, String) {
    let exp = now + Duration::hours(DEMO_TOKEN_TTL_HOURS);
    (encode_unsigned(exp, "1"), format!("demo-refresh-token-{}", now.timestamp_millis()))
}

/// Payload the live backend would have produced for this call.
pub fn fallback_body(endpoint: &str, method: Method, body: Option<&Value>, now: DateTime<Utc>) -> Value {
    let path = path_of(endpoint);
    match (path, method) {
        ("/auth/login", _) => {
            let (token, refresh) = token_pair(now);
            let mut user = demo_users().remove(0);
            if let (Some(obj), Some(email)) = (user.as_object_mut(), body.and_then(|b| b.get("email"))) {
                obj.insert("email".into(), email.clone());
            }
            json!({ "token": token, "refreshToken": refresh, "user": user })
        }
        ("/auth/refresh", _) => {
            let (token, refresh) = token_pair(now);
            json!({ "token": token, "refreshToken": refresh })
        }
        ("/auth/logout", _) => json!({ "success": true }),
        ("/auth/me", _) | ("/auth/profile", _) => json!({ "user": demo_users().remove(0) }),
        ("/users", Method::Get) | ("/users/", Method::Get) => json!({ "data": demo_users() }),
        ("/users", Method::Post) => {
            let base = json!({"id": "100", "name": "New User", "email": "newuser@example.com", "role": "employee", "department": "General", "status": "online"});
            json!({ "data": echo(base, body, "user") })
        }
        ("/dashboard/stats", _) => {
            let users = demo_users();
            let count = |role: &str| users.iter().filter(|u| u["role"] == role).count();
            json!({ "data": {
                "total_users": users.len(),
                "online_users": users.iter().filter(|u| u["status"] == "online").count(),
                "offline_users": users.iter().filter(|u| u["status"] == "offline").count(),
                "employees": count("employee"),
                "managers": count("manager"),
                "general_managers": count("general_manager"),
                "departments": 3,
            }})
        }
        ("/workingtimes", Method::Get) | ("/workingtimes/", Method::Get) => {
            json!({ "data": [working_time("1", "1", now, false)] })
        }
        ("/workingtimes", Method::Post) => {
            let uid = body
                .and_then(|b| b.pointer("/working_time/user_id"))
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| "1".to_string());
            json!({ "data": echo(working_time("100", &uid, now, false), body, "working_time") })
        }
        _ => item_fallback(path, method, body, now),
    }
}

fn item_fallback(path: &str, method: Method, body: Option<&Value>, now: DateTime<Utc>) -> Value {
    if let Some(c) = WT_TODAY.captures(path) {
        return json!({ "data": [working_time("1", &c[1], now, false)] });
    }
    if WT_STATS.is_match(path) {
        return json!({ "data": { "total_logs": 1, "total_hours": 0.0, "active_sessions": 1, "completed_sessions": 0 } });
    }
    if let Some(c) = WT_ITEM.captures(path) {
        let id = &c[1];
        return match method {
            Method::Get => json!({ "data": working_time(id, "1", now, false) }),
            Method::Put | Method::Patch => {
                let base = working_time(id, "1", now, false);
                json!({ "data": echo(base, body, "working_time") })
            }
            Method::Delete => json!({ "data": { "id": id } }),
            Method::Post => generic(),
        };
    }
    if let Some(c) = USER_ITEM.captures(path) {
        let id = &c[1];
        let known = demo_users().into_iter().find(|u| u["id"] == id);
        let base = known.unwrap_or_else(|| {
            json!({"id": id, "name": "Demo User", "email": "demo@example.com", "role": "employee", "department": "General", "status": "online"})
        });
        return match method {
            Method::Get => json!({ "data": base }),
            Method::Put | Method::Patch => json!({ "data": echo(base, body, "user") }),
            Method::Delete => json!({ "data": { "id": id } }),
            Method::Post => generic(),
        };
    }
    generic()
}

fn generic() -> Value {
    json!({ "success": true, "message": "Fallback response" })
}
