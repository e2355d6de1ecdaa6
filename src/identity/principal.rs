use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};

/// Client-side role vocabulary. The backend says `general_manager`; the client
/// only ever stores and compares the short form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Employee,
    Manager,
    Gm,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Employee, Role::Manager, Role::Gm];

    /// Normalize an external role string. Both vocabularies are accepted since
    /// persisted sessions written by older clients still carry the long form.
    pub fn parse(raw: &str) -> AppResult<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            "general_manager" | "gm" => Ok(Role::Gm),
            other => Err(AppError::user("unknown_role".to_string(), format!("unknown role '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Gm => "gm",
        }
    }

    /// Name used by the REST backend.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Gm => "general_manager",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Employee => "Employee",
            Role::Manager => "Manager",
            Role::Gm => "General Manager",
        }
    }

    /// Landing route for the role.
    pub fn home_path(&self) -> String {
        format!("/{}", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = AppError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Role::parse(&value) }
}

impl From<Role> for String {
    fn from(r: Role) -> Self { r.as_str().to_string() }
}

pub(crate) fn id_from_string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

/// Authenticated user as held in the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

impl User {
    /// Parse a user object from any JSON payload shape the backend or an old
    /// persisted session may produce.
    pub fn from_json(v: &serde_json::Value) -> AppResult<User> {
        let raw_role = v
            .get("role")
            .and_then(|r| r.as_str())
            .ok_or_else(|| AppError::invalid_response("user: missing or non-string role"))?;
        let role = Role::parse(raw_role)?;
        let mut user: User =
            serde_json::from_value(v.clone()).map_err(|e| AppError::invalid_response(format!("user: {}", e)))?;
        user.role = role;
        Ok(user)
    }
}
