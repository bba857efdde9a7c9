use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{OrganizationRecord, ServiceRecord, UserRecord};

/// Login body. A missing or malformed body is equivalent to the default;
/// login does not strictly require one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub organization_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserRecord,
    pub organization: Option<OrganizationRecord>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserRecord,
    pub organization: Option<OrganizationRecord>,
    pub expires_at: DateTime<Utc>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Minimal organization shape listed in a selection-required response.
#[derive(Debug, Serialize)]
pub struct OrganizationSummary {
    pub id: String,
    pub name: String,
}

impl From<&OrganizationRecord> for OrganizationSummary {
    fn from(org: &OrganizationRecord) -> Self {
        Self {
            id: org.id.clone(),
            name: org.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SelectionErrorResponse {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizations: Option<Vec<OrganizationSummary>>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub user: UserRecord,
    pub is_platform_admin: bool,
    pub organizations: Vec<OrganizationContext>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationContext {
    #[serde(flatten)]
    pub organization: OrganizationRecord,
    pub services: Vec<ServiceRecord>,
}
