//! Server-side session state, keyed by a one-way hash of the bearer token.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted session record. The raw token is never stored; only its
/// SHA-256 hash reaches a backend.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a record issued now. `expires_at` is always strictly after
    /// `issued_at` for any positive ttl.
    pub fn new(
        token_hash: String,
        user_id: String,
        organization_id: Option<String>,
        ttl: Duration,
    ) -> Self {
        let issued_at = Utc::now();
        Self {
            token_hash,
            user_id,
            organization_id,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// Expired records are logically dead; the session manager purges them
    /// lazily on next access.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Fresh issuance window over the same token hash, preserving identity.
    pub fn renewed(&self, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            token_hash: self.token_hash.clone(),
            user_id: self.user_id.clone(),
            organization_id: self.organization_id.clone(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }
}
