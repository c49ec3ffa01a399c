use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    SubAgent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::SubAgent => "SUB_AGENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "SUB_AGENT" => Ok(Role::SubAgent),
            other => Err(CoreError::ValidationError(format!("Unknown role: {}", other))),
        }
    }
}

/// A login belonging to exactly one agency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(agency_id: Uuid, username: &str, password_hash: String, role: Role) -> CoreResult<Self> {
        let username = normalize_username(username)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            agency_id,
            username,
            password_hash,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Usernames are case-insensitive: stored lowercase, 3-64 chars of `[a-z0-9._-]`.
pub fn normalize_username(raw: &str) -> CoreResult<String> {
    let username = raw.trim().to_lowercase();
    if username.len() < 3 || username.len() > 64 {
        return Err(CoreError::ValidationError(
            "username must be between 3 and 64 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(CoreError::ValidationError(
            "username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(username)
}
