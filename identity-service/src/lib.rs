pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use service_core::axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::directory::Directory;
use crate::services::metrics::UserMetrics;
use crate::services::session::SessionManager;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IdentityConfig>,
    pub directory: Arc<dyn Directory>,
    pub sessions: SessionManager,
    pub metrics: UserMetrics,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|origin| {
                    origin
                        .parse::<service_core::axum::http::HeaderValue>()
                        .map_err(|e| {
                            tracing::error!(origin, error = %e, "Skipping invalid CORS origin");
                            e
                        })
                        .ok()
                })
                .collect::<Vec<service_core::axum::http::HeaderValue>>(),
        )
        .allow_methods([
            service_core::axum::http::Method::GET,
            service_core::axum::http::Method::POST,
            service_core::axum::http::Method::PATCH,
            service_core::axum::http::Method::DELETE,
            service_core::axum::http::Method::OPTIONS,
        ])
        .allow_headers([service_core::axum::http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/session", get(handlers::auth::session))
        .route("/api/auth/context", get(handlers::auth::context))
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/api/users/:id",
            get(handlers::users::get_user)
                .patch(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

/// Service health check
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state.directory.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Directory health check failed");
        e
    })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "directory": "up"
        }
    })))
}
