use identity_service::{
    build_router,
    config::{IdentityConfig, SessionBackend},
    services::{
        directory::SqliteDirectory,
        metrics::UserMetrics,
        secret::{FileSecretStore, SecretProvider, SecretStore},
        session::SessionManager,
        session_store::{RemoteSessionStore, SessionStore, SqliteSessionStore},
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    // In-memory SQLite lives per-connection; a larger pool would fragment it.
    let max_connections = if config.database_url.contains(":memory:") {
        1
    } else {
        5
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&config.database_url)
        .await
        .map_err(service_core::error::AppError::from)?;

    let directory = SqliteDirectory::new(pool.clone());
    directory.init_schema().await?;
    directory.seed_platform().await?;
    tracing::info!("Directory initialized");

    let session_store: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Sqlite => {
            let store = SqliteSessionStore::new(pool.clone());
            store.init_schema().await?;
            Arc::new(store)
        }
        SessionBackend::Remote => {
            tracing::info!(url = %config.session.router_url, "Using remote session store");
            Arc::new(RemoteSessionStore::new(config.session.router_url.clone()))
        }
    };

    let secret_store: Option<Arc<dyn SecretStore>> = config
        .session
        .secret_store_path
        .as_ref()
        .map(|path| Arc::new(FileSecretStore::new(path)) as Arc<dyn SecretStore>);
    let secrets = SecretProvider::from_env(secret_store);

    let sessions = SessionManager::new(
        session_store,
        secrets,
        chrono::Duration::days(config.session.ttl_days),
        config.is_prod(),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        directory: Arc::new(directory),
        sessions,
        metrics: UserMetrics::default(),
    };

    let app = build_router(state).await?;

    let addr = config.common.bind_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
