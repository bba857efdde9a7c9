//! User model and the closed role set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::OrganizationRecord;

/// Platform roles. Closed set: adding a role is a compile-time-visible
/// change, and every consumer matches totally over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform-wide administrator.
    Admin,
    /// Administrator scoped to their own organizations.
    OrganizationAdmin,
    /// Regular user with no management rights.
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::OrganizationAdmin => "organization_admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "organization_admin" => Ok(Role::OrganizationAdmin),
            "member" => Ok(Role::Member),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user together with the organizations they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub organizations: Vec<OrganizationRecord>,
}

impl UserRecord {
    /// Deduplicated ids of the organizations this user belongs to.
    pub fn organization_ids(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        self.organizations
            .iter()
            .filter(|org| seen.insert(org.id.clone()))
            .map(|org| org.id.clone())
            .collect()
    }

    pub fn belongs_to(&self, organization_id: &str) -> bool {
        self.organizations.iter().any(|org| org.id == organization_id)
    }
}
