use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Upper bound on hierarchy depth walked when checking for cycles.
pub const MAX_AGENCY_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgencyStatus {
    Active,
    Suspended,
}

impl AgencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgencyStatus::Active => "ACTIVE",
            AgencyStatus::Suspended => "SUSPENDED",
        }
    }
}

impl fmt::Display for AgencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgencyStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AgencyStatus::Active),
            "SUSPENDED" => Ok(AgencyStatus::Suspended),
            other => Err(CoreError::ValidationError(format!("Unknown agency status: {}", other))),
        }
    }
}

/// A tenant. Agencies form a tree through `parent_agency_id`; children are
/// always derived by query, never stored on the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agency {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub parent_agency_id: Option<Uuid>,
    pub status: AgencyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agency {
    pub fn new(name: &str, code: &str, parent_agency_id: Option<Uuid>) -> CoreResult<Self> {
        let name = name.trim();
        if name.is_empty() || name.len() > 200 {
            return Err(CoreError::ValidationError(
                "agency name must be between 1 and 200 characters".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: normalize_code(code)?,
            parent_agency_id,
            status: AgencyStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == AgencyStatus::Active
    }
}

/// Agency codes are stored uppercase: 2-16 chars of `[A-Z0-9-]`.
pub fn normalize_code(raw: &str) -> CoreResult<String> {
    let code = raw.trim().to_uppercase();
    if code.len() < 2 || code.len() > 16 || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(CoreError::ValidationError(format!(
            "invalid agency code '{}'",
            raw
        )));
    }
    Ok(code)
}

/// Rejects a re-parenting that would make `agency_id` its own ancestor.
///
/// `ancestry` is the chain starting at the proposed parent and walking up
/// towards the root.
pub fn ensure_acyclic(agency_id: Uuid, ancestry: &[Uuid]) -> CoreResult<()> {
    if ancestry.len() > MAX_AGENCY_DEPTH {
        return Err(CoreError::ValidationError(format!(
            "agency hierarchy deeper than {} levels",
            MAX_AGENCY_DEPTH
        )));
    }
    if ancestry.contains(&agency_id) {
        return Err(CoreError::ValidationError(
            "parent assignment would create a cycle".to_string(),
        ));
    }
    Ok(())
}
