use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identifier of the user-management service in the service registry. The
/// access-control layer refuses user-management requests while this service
/// is not active.
pub const USER_MANAGEMENT_SERVICE_ID: &str = "svc-user-management";

/// A platform service offered to organizations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub service_type: String,
    pub status: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
