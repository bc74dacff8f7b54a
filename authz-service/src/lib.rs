pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod repo;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthzConfig;
use crate::services::{AuthorizationService, BatchService};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::authz::check_permission,
        handlers::authz::check_permission_batch,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            handlers::authz::CheckPermissionRequest,
            handlers::authz::CheckPermissionResponse,
            handlers::authz::BatchCheckRequest,
            handlers::authz::BatchCheckResponse,
            models::Role,
            models::Permission,
            models::Group,
            models::PolicyEffect,
        )
    ),
    tags(
        (name = "Authorization", description = "Permission checks and batched relationship reads"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AuthzConfig,
    pub authz: AuthorizationService,
    pub batch: BatchService,
    /// Present when the service runs against Postgres; `None` in
    /// memory-backed tests and local dev.
    pub pool: Option<sqlx::PgPool>,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    // Only add Swagger UI if enabled in config
    let swagger_enabled = match state.config.environment {
        crate::config::Environment::Dev => true,
        crate::config::Environment::Prod => {
            state.config.swagger.enabled == crate::config::SwaggerMode::Public
        }
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Still provide the OpenAPI JSON for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let cors_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| {
            o.parse::<axum::http::HeaderValue>()
                .map_err(|e| {
                    tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                    e
                })
                .ok()
        })
        .collect::<Vec<axum::http::HeaderValue>>();

    let app = app
        .route("/authz/check", post(handlers::authz::check_permission))
        .route(
            "/authz/check-batch",
            post(handlers::authz::check_permission_batch),
        )
        .route(
            "/authz/batch/user-roles",
            post(handlers::authz::user_roles_batch),
        )
        .route(
            "/authz/batch/user-permissions",
            post(handlers::authz::user_permissions_batch),
        )
        .route(
            "/authz/batch/permission-roles",
            post(handlers::authz::permission_roles_batch),
        )
        .route(
            "/authz/batch/user-groups",
            post(handlers::authz::user_groups_batch),
        )
        .with_state(state)
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
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
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    if let Some(pool) = &state.pool {
        repo::postgres::health_check(pool).await.map_err(|e| {
            tracing::error!(error = %e, "PostgreSQL health check failed");
            AppError::ServiceUnavailable
        })?;
    }

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
