use std::net::SocketAddr;
use std::sync::Arc;

use authz_service::{
    build_router,
    config::AuthzConfig,
    repo::{postgres, PgStore},
    services::{
        AbacEvaluator, AuditLogger, AuthorizationService, BatchService, PermissionChecker,
        RoleResolver,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthzConfig::from_env()?;

    // Initialize tracing/logging using shared logic
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    // Initialize metrics
    authz_service::services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authorization service"
    );

    // Initialize database connection
    tracing::info!("Initializing database connection");
    let pool = postgres::create_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;

    postgres::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database initialized successfully");

    // Wire the decision engine onto the read contracts
    let store = Arc::new(PgStore::new(pool.clone()));
    let resolver = RoleResolver::new(store.clone());
    let authz = AuthorizationService::new(
        resolver.clone(),
        PermissionChecker::new(store.clone()),
        AbacEvaluator::new(store.clone()),
        AuditLogger::new(store.clone()),
    );
    let batch = BatchService::new(store, resolver);

    // Create application state
    let state = AppState {
        config: config.clone(),
        authz,
        batch,
        pool: Some(pool),
    };

    // Build application router
    let app = build_router(state).await?;

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
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
