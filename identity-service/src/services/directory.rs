//! User, organization, and service directory.
//!
//! Handlers depend on the [`Directory`] trait; [`SqliteDirectory`] is the
//! shipping implementation and owns the schema and the first-boot seed data.

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{OrganizationRecord, Role, ServiceRecord, UserRecord, USER_MANAGEMENT_SERVICE_ID};

/// Home organization of the platform itself; seeded on first boot.
pub const TESSARO_ORGANIZATION_ID: &str = "org-tessaro";

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@tessaro.local";
pub const DEFAULT_ADMIN_NAME: &str = "Tessaro Administrator";

#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub organization_ids: Vec<String>,
}

/// Partial update; `None` leaves the field untouched. `organization_ids`
/// replaces the full membership set when present.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub avatar_url: Option<Option<String>>,
    pub organization_ids: Option<Vec<String>>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;
    async fn list_users(&self) -> Result<Vec<UserRecord>, AppError>;
    async fn create_user(&self, input: CreateUserInput) -> Result<UserRecord, AppError>;
    async fn update_user(
        &self,
        id: &str,
        input: UpdateUserInput,
    ) -> Result<Option<UserRecord>, AppError>;
    async fn delete_user(&self, id: &str) -> Result<bool, AppError>;
    async fn count_users(&self) -> Result<i64, AppError>;

    async fn get_organization_by_id(
        &self,
        id: &str,
    ) -> Result<Option<OrganizationRecord>, AppError>;

    async fn get_service_by_id(&self, id: &str) -> Result<Option<ServiceRecord>, AppError>;
    async fn list_services_for_organizations(
        &self,
        organization_ids: &[String],
    ) -> Result<Vec<ServiceRecord>, AppError>;

    async fn ensure_default_admin(&self) -> Result<(), AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                plan TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_organizations (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                PRIMARY KEY (user_id, organization_id)
            );

            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                service_type TEXT NOT NULL,
                status TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS service_organizations (
                service_id TEXT NOT NULL REFERENCES services(id),
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                PRIMARY KEY (service_id, organization_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Seed the platform organization and the user-management service.
    /// Idempotent; safe to run on every boot.
    pub async fn seed_platform(&self) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, plan, status, created_at, updated_at)
            VALUES (?, 'Tessaro', 'enterprise', 'active', ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(TESSARO_ORGANIZATION_ID)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO services (id, name, service_type, status, description, created_at, updated_at)
            VALUES (?, 'User Management', 'platform', 'active', 'Directory and access administration', ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(USER_MANAGEMENT_SERVICE_ID)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO service_organizations (service_id, organization_id)
            VALUES (?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(USER_MANAGEMENT_SERVICE_ID)
        .bind(TESSARO_ORGANIZATION_ID)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn organizations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrganizationRecord>, AppError> {
        let organizations = sqlx::query_as::<_, OrganizationRecord>(
            r#"
            SELECT o.id, o.name, o.plan, o.status, o.created_at, o.updated_at
            FROM organizations o
            JOIN user_organizations uo ON uo.organization_id = o.id
            WHERE uo.user_id = ?
            ORDER BY o.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(organizations)
    }

    async fn hydrate(&self, row: SqliteRow) -> Result<UserRecord, AppError> {
        let id: String = row.try_get("id")?;
        let role_text: String = row.try_get("role")?;
        let role = Role::from_str(&role_text)
            .map_err(|msg| AppError::InternalError(anyhow::anyhow!(msg)))?;
        let organizations = self.organizations_for_user(&id).await?;

        Ok(UserRecord {
            id,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role,
            avatar_url: row.try_get("avatar_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            organizations,
        })
    }

    /// Reject membership sets that reference unknown organizations.
    async fn check_organizations_exist(&self, ids: &[String]) -> Result<(), AppError> {
        for id in ids {
            if self.get_organization_by_id(id).await?.is_none() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unknown organization: {}",
                    id
                )));
            }
        }
        Ok(())
    }

    async fn replace_memberships(
        &self,
        user_id: &str,
        organization_ids: &[String],
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_organizations WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        for organization_id in dedup(organization_ids) {
            sqlx::query(
                "INSERT INTO user_organizations (user_id, organization_id) VALUES (?, ?)",
            )
            .bind(user_id)
            .bind(&organization_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn map_insert_error(err: sqlx::Error) -> AppError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return AppError::Conflict(anyhow::anyhow!("Email address already in use"));
        }
    }
    AppError::from(err)
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, AppError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate(row).await?);
        }
        Ok(users)
    }

    async fn create_user(&self, input: CreateUserInput) -> Result<UserRecord, AppError> {
        self.check_organizations_exist(&input.organization_ids).await?;

        let id = format!("user-{}", Uuid::new_v4());
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.role.as_str())
        .bind(&input.avatar_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        self.replace_memberships(&id, &input.organization_ids).await?;

        self.get_user_by_id(&id)
            .await?
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Created user not found")))
    }

    async fn update_user(
        &self,
        id: &str,
        input: UpdateUserInput,
    ) -> Result<Option<UserRecord>, AppError> {
        let Some(existing) = self.get_user_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(organization_ids) = &input.organization_ids {
            self.check_organizations_exist(organization_ids).await?;
        }

        let name = input.name.unwrap_or(existing.name);
        let email = input.email.unwrap_or(existing.email);
        let role = input.role.unwrap_or(existing.role);
        let avatar_url = input.avatar_url.unwrap_or(existing.avatar_url);

        sqlx::query(
            r#"
            UPDATE users SET name = ?, email = ?, role = ?, avatar_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(&email)
        .bind(role.as_str())
        .bind(&avatar_url)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        if let Some(organization_ids) = &input.organization_ids {
            self.replace_memberships(id, organization_ids).await?;
        }

        self.get_user_by_id(id).await
    }

    async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        sqlx::query("DELETE FROM user_organizations WHERE user_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_organization_by_id(
        &self,
        id: &str,
    ) -> Result<Option<OrganizationRecord>, AppError> {
        let organization = sqlx::query_as::<_, OrganizationRecord>(
            "SELECT * FROM organizations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(organization)
    }

    async fn get_service_by_id(&self, id: &str) -> Result<Option<ServiceRecord>, AppError> {
        let service =
            sqlx::query_as::<_, ServiceRecord>("SELECT * FROM services WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(service)
    }

    async fn list_services_for_organizations(
        &self,
        organization_ids: &[String],
    ) -> Result<Vec<ServiceRecord>, AppError> {
        let mut services: Vec<ServiceRecord> = Vec::new();
        let mut seen = BTreeSet::new();
        for organization_id in dedup(organization_ids) {
            let rows = sqlx::query_as::<_, ServiceRecord>(
                r#"
                SELECT s.id, s.name, s.service_type, s.status, s.description,
                       s.created_at, s.updated_at
                FROM services s
                JOIN service_organizations so ON so.service_id = s.id
                WHERE so.organization_id = ?
                ORDER BY s.name
                "#,
            )
            .bind(&organization_id)
            .fetch_all(&self.pool)
            .await?;
            for service in rows {
                if seen.insert(service.id.clone()) {
                    services.push(service);
                }
            }
        }
        Ok(services)
    }

    /// Create the default administrator when the directory has no users.
    async fn ensure_default_admin(&self) -> Result<(), AppError> {
        if self.get_user_by_email(DEFAULT_ADMIN_EMAIL).await?.is_some() {
            return Ok(());
        }

        let created = self
            .create_user(CreateUserInput {
                name: DEFAULT_ADMIN_NAME.to_string(),
                email: DEFAULT_ADMIN_EMAIL.to_string(),
                role: Role::OrganizationAdmin,
                avatar_url: None,
                organization_ids: vec![TESSARO_ORGANIZATION_ID.to_string()],
            })
            .await?;
        tracing::info!(user_id = %created.id, email = DEFAULT_ADMIN_EMAIL, "Seeded default administrator");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
