//! HTTP surface tests: the router wired onto a memory-backed engine.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use authz_service::config::{
    AuthzConfig, DatabaseConfig, Environment, SecurityConfig, SwaggerConfig, SwaggerMode,
};
use authz_service::repo::MemoryStore;
use authz_service::services::{
    AbacEvaluator, AuditLogger, AuthorizationService, BatchService, PermissionChecker,
    RoleResolver,
};
use authz_service::{build_router, AppState};

fn test_config() -> AuthzConfig {
    AuthzConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "authz-service".to_string(),
        service_version: "test".to_string(),
        log_level: "info".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        otlp_endpoint: None,
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

async fn app(store: &MemoryStore) -> axum::Router {
    let shared: Arc<MemoryStore> = Arc::new(store.clone());
    let resolver = RoleResolver::new(shared.clone());
    let state = AppState {
        config: test_config(),
        authz: AuthorizationService::new(
            resolver.clone(),
            PermissionChecker::new(shared.clone()),
            AbacEvaluator::new(shared.clone()),
            AuditLogger::new(shared.clone()),
        ),
        batch: BatchService::new(shared, resolver),
        pool: None,
    };
    build_router(state).await.unwrap()
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn check_endpoint_answers_a_decision_not_a_fault() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);

    let app = app(&store).await;

    let (status, body) = post_json(
        &app,
        "/authz/check",
        json!({ "user_id": user, "permission": "transaction:read" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], json!(true));

    // A malformed permission is still a 200 with a denial, never a fault.
    let (status, body) = post_json(
        &app,
        "/authz/check",
        json!({ "user_id": user, "permission": "transactionread" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], json!(false));
    assert_eq!(body["reason"], json!("Invalid input provided"));
}

#[tokio::test]
async fn check_batch_reports_all_allowed() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);

    let app = app(&store).await;
    let (status, body) = post_json(
        &app,
        "/authz/check-batch",
        json!({
            "checks": [
                { "user_id": user, "permission": "transaction:read" },
                { "user_id": user, "permission": "transaction:delete" },
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["all_allowed"], json!(false));
}

#[tokio::test]
async fn user_roles_batch_drops_invalid_ids() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);

    let app = app(&store).await;
    let (status, body) = post_json(
        &app,
        "/authz/batch/user-roles",
        json!({ "ids": [user, "not-a-uuid"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_id"], json!(user));
    assert_eq!(entries[0]["roles"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_reports_healthy_without_a_pool() {
    let store = MemoryStore::new();
    let app = app(&store).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
