//! Test helper module for identity-service integration tests.
//!
//! Spins the full router up over an in-memory SQLite database; requests go
//! through `tower::ServiceExt::oneshot`, no listener needed.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use identity_service::config::{
    Environment, IdentityConfig, SecurityConfig, SessionBackend, SessionConfig,
};
use identity_service::models::{Role, UserRecord};
use identity_service::services::directory::{
    CreateUserInput, Directory, SqliteDirectory, TESSARO_ORGANIZATION_ID,
};
use identity_service::services::metrics::UserMetrics;
use identity_service::services::secret::SecretProvider;
use identity_service::services::session::{SessionManager, SESSION_COOKIE};
use identity_service::services::session_store::SqliteSessionStore;
use identity_service::{build_router, AppState};
use service_core::config::Config as CoreConfig;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789ab";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // One connection: an in-memory SQLite database lives per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");

        let directory = SqliteDirectory::new(pool.clone());
        directory.init_schema().await.expect("schema");
        directory.seed_platform().await.expect("seed");

        let session_store = SqliteSessionStore::new(pool.clone());
        session_store.init_schema().await.expect("session schema");

        let sessions = SessionManager::new(
            Arc::new(session_store),
            SecretProvider::new(None, Some(TEST_SECRET.to_string())),
            chrono::Duration::days(7),
            false,
        );

        let config = IdentityConfig {
            common: CoreConfig { port: 0 },
            environment: Environment::Dev,
            service_name: "identity-service-test".to_string(),
            service_version: "test".to_string(),
            log_level: "warn".to_string(),
            database_url: "sqlite::memory:".to_string(),
            session: SessionConfig {
                ttl_days: 7,
                backend: SessionBackend::Sqlite,
                secret_store_path: None,
                router_url: "http://localhost".to_string(),
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
        };

        let state = AppState {
            config: Arc::new(config),
            directory: Arc::new(directory),
            sessions,
            metrics: UserMetrics::default(),
        };

        let router = build_router(state.clone()).await.expect("router");
        Self {
            router,
            state,
            pool,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("response")
    }

    /// Log in as the default actor, returning the session cookie pair.
    pub async fn login(&self, body: Option<serde_json::Value>) -> String {
        let response = self.request("POST", "/api/auth/login", None, body).await;
        assert_eq!(response.status(), 200, "login failed");
        extract_session_cookie(&response).expect("no session cookie on login")
    }

    pub async fn seed_organization(&self, id: &str, name: &str) {
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO organizations (id, name, plan, status, created_at, updated_at) VALUES (?, ?, 'starter', 'active', ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .expect("seed organization");
    }

    pub async fn seed_user(&self, name: &str, role: Role, organization_ids: &[&str]) -> UserRecord {
        self.state
            .directory
            .create_user(CreateUserInput {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
                role,
                avatar_url: None,
                organization_ids: organization_ids.iter().map(|id| id.to_string()).collect(),
            })
            .await
            .expect("seed user")
    }

    /// Mint a session for a user directly, bypassing the login route.
    pub async fn session_cookie_for(
        &self,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> String {
        let (token, _) = self
            .state
            .sessions
            .create_session(user_id, organization_id.map(str::to_string), None)
            .await
            .expect("create session");
        cookie_pair(&token)
    }

    /// Attach the default admin to an extra organization.
    pub async fn add_default_admin_to(&self, organization_id: &str) -> UserRecord {
        self.state
            .directory
            .ensure_default_admin()
            .await
            .expect("default admin");
        let admin = self
            .state
            .directory
            .get_user_by_email("admin@tessaro.local")
            .await
            .expect("lookup")
            .expect("default admin exists");
        let mut org_ids: Vec<String> = admin.organization_ids();
        org_ids.push(organization_id.to_string());
        self.state
            .directory
            .update_user(
                &admin.id,
                identity_service::services::directory::UpdateUserInput {
                    organization_ids: Some(org_ids),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("admin present")
    }
}

pub fn cookie_pair(token: &str) -> String {
    format!("{}={}", SESSION_COOKIE, urlencoding::encode(token))
}

/// The `name=value` pair from the response's session `Set-Cookie`, if any.
pub fn extract_session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(SESSION_COOKIE))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

pub fn raw_set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}

pub fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
