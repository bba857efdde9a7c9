//! Session persistence backends.
//!
//! The manager talks to a [`SessionStore`] trait object, so backends are
//! swappable via configuration: SQLite in the same database the directory
//! uses, or the remote HTTP session service.

use async_trait::async_trait;
use reqwest::StatusCode;
use service_core::error::AppError;
use sqlx::SqlitePool;

use crate::models::SessionRecord;

/// Keyed storage of session records by token hash. All operations are
/// idempotent; `delete` of a missing record is not an error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, record: &SessionRecord) -> Result<(), AppError>;
    async fn get(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError>;
    async fn replace(&self, record: &SessionRecord) -> Result<(), AppError>;
    async fn delete(&self, token_hash: &str) -> Result<(), AppError>;
}

/// Sessions stored alongside the directory tables.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                organization_id TEXT,
                issued_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, organization_id, issued_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(token_hash) DO UPDATE SET
                user_id = excluded.user_id,
                organization_id = excluded.organization_id,
                issued_at = excluded.issued_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&record.token_hash)
        .bind(&record.user_id)
        .bind(&record.organization_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT token_hash, user_id, organization_id, issued_at, expires_at FROM sessions WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn replace(&self, record: &SessionRecord) -> Result<(), AppError> {
        self.create(record).await
    }

    async fn delete(&self, token_hash: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Sessions stored in the remote session service behind the platform
/// router. Records are addressed as `/tessaro/sessions/{token_hash}`.
pub struct RemoteSessionStore {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSessionStore {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/tessaro/sessions", self.base_url)
    }

    fn record_url(&self, token_hash: &str) -> String {
        format!("{}/tessaro/sessions/{}", self.base_url, token_hash)
    }

    fn upstream_error(context: &str, err: reqwest::Error) -> AppError {
        tracing::error!(error = %err, context, "Session service request failed");
        AppError::BadGateway(format!("session service: {}", context))
    }

    fn unexpected_status(context: &str, status: StatusCode) -> AppError {
        tracing::error!(%status, context, "Session service returned unexpected status");
        AppError::BadGateway(format!("session service: {} returned {}", context, status))
    }
}

#[async_trait]
impl SessionStore for RemoteSessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.collection_url())
            .json(record)
            .send()
            .await
            .map_err(|err| Self::upstream_error("create", err))?;

        if !response.status().is_success() {
            return Err(Self::unexpected_status("create", response.status()));
        }
        Ok(())
    }

    async fn get(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError> {
        let response = self
            .client
            .get(self.record_url(token_hash))
            .send()
            .await
            .map_err(|err| Self::upstream_error("get", err))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::unexpected_status("get", response.status()));
        }

        let record = response
            .json::<SessionRecord>()
            .await
            .map_err(|err| Self::upstream_error("decode", err))?;
        Ok(Some(record))
    }

    async fn replace(&self, record: &SessionRecord) -> Result<(), AppError> {
        let response = self
            .client
            .put(self.record_url(&record.token_hash))
            .json(record)
            .send()
            .await
            .map_err(|err| Self::upstream_error("replace", err))?;

        if !response.status().is_success() {
            return Err(Self::unexpected_status("replace", response.status()));
        }
        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(self.record_url(token_hash))
            .send()
            .await
            .map_err(|err| Self::upstream_error("delete", err))?;

        // Deleting an unknown session is fine; revocation is idempotent.
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(Self::unexpected_status("delete", response.status()))
    }
}
