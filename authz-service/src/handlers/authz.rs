//! Authorization evaluation handlers.
//!
//! Implements the authz/check endpoints which:
//! - Evaluate single and batched permission checks
//! - Expose the batched relationship reads (roles, permissions, groups)
//! - Always answer a check with a terminal decision, never a fault

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Group, Permission, Role};
use crate::services::CheckRequest;
use crate::utils::ValidatedJson;
use crate::AppState;
use service_core::error::AppError;
use service_core::middleware::tracing::request_id;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Single permission check request. Field rules live in the engine, which
/// answers a malformed check with a generic denial instead of a transport
/// fault.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckPermissionRequest {
    /// Principal being checked.
    pub user_id: String,
    /// Permission in `resource:action` form; normalized before evaluation.
    pub permission: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub scope_type: Option<String>,
    pub scope_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub subject_attributes: Option<Map<String, Value>>,
    #[schema(value_type = Option<Object>)]
    pub resource_attributes: Option<Map<String, Value>>,
    #[schema(value_type = Option<Object>)]
    pub context_attributes: Option<Map<String, Value>>,
}

/// Terminal decision for one check.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
    #[schema(example = "User does not have permission")]
    pub reason: String,
}

/// Batched permission check request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchCheckRequest {
    #[validate(nested)]
    pub checks: Vec<CheckPermissionRequest>,
}

/// Batched permission check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchCheckResponse {
    pub results: Vec<CheckPermissionResponse>,
    pub all_allowed: bool,
}

/// Batched relationship read request: raw ids, parsed independently.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IdsRequest {
    #[validate(length(max = 1000))]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRolesEntry {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRolesResponse {
    pub entries: Vec<UserRolesEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPermissionsEntry {
    pub user_id: Uuid,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPermissionsResponse {
    pub entries: Vec<UserPermissionsEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionRolesEntry {
    pub permission_id: Uuid,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionRolesResponse {
    pub entries: Vec<PermissionRolesEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserGroupsEntry {
    pub user_id: Uuid,
    pub groups: Vec<Group>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserGroupsResponse {
    pub entries: Vec<UserGroupsEntry>,
}

impl CheckPermissionRequest {
    fn into_check(self, request_id: Option<String>) -> CheckRequest {
        CheckRequest {
            user_id: self.user_id,
            permission: self.permission,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            scope_type: self.scope_type,
            scope_id: self.scope_id,
            subject_attributes: self.subject_attributes,
            resource_attributes: self.resource_attributes,
            context_attributes: self.context_attributes,
            request_id,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Evaluate a single permission check.
///
/// POST /authz/check
#[utoipa::path(
    post,
    path = "/authz/check",
    request_body = CheckPermissionRequest,
    responses(
        (status = 200, description = "Terminal decision", body = CheckPermissionResponse)
    ),
    tag = "Authorization"
)]
pub async fn check_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<CheckPermissionRequest>,
) -> Json<CheckPermissionResponse> {
    let correlation = request_id(&headers).map(|s| s.to_string());
    let decision = state
        .authz
        .check_permission(req.into_check(correlation))
        .await;
    Json(CheckPermissionResponse {
        allowed: decision.allowed,
        reason: decision.reason,
    })
}

/// Evaluate multiple permission checks. Each check is independent; one
/// malformed entry denies that entry only.
///
/// POST /authz/check-batch
#[utoipa::path(
    post,
    path = "/authz/check-batch",
    request_body = BatchCheckRequest,
    responses(
        (status = 200, description = "Terminal decisions", body = BatchCheckResponse)
    ),
    tag = "Authorization"
)]
pub async fn check_permission_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<BatchCheckRequest>,
) -> Json<BatchCheckResponse> {
    let correlation = request_id(&headers).map(|s| s.to_string());

    let mut results = Vec::with_capacity(req.checks.len());
    for check in req.checks {
        let decision = state
            .authz
            .check_permission(check.into_check(correlation.clone()))
            .await;
        results.push(CheckPermissionResponse {
            allowed: decision.allowed,
            reason: decision.reason,
        });
    }

    let all_allowed = results.iter().all(|r| r.allowed);
    Json(BatchCheckResponse {
        results,
        all_allowed,
    })
}

/// Effective roles for a batch of user ids.
///
/// POST /authz/batch/user-roles
pub async fn user_roles_batch(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IdsRequest>,
) -> Result<Json<UserRolesResponse>, AppError> {
    let now = Utc::now();
    let entries = state
        .batch
        .get_user_roles_batch(&req.ids, now)
        .await?
        .into_iter()
        .map(|(user_id, roles)| UserRolesEntry { user_id, roles })
        .collect();
    Ok(Json(UserRolesResponse { entries }))
}

/// Effective permissions for a batch of user ids.
///
/// POST /authz/batch/user-permissions
pub async fn user_permissions_batch(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IdsRequest>,
) -> Result<Json<UserPermissionsResponse>, AppError> {
    let now = Utc::now();
    let entries = state
        .batch
        .get_user_permissions_batch(&req.ids, now)
        .await?
        .into_iter()
        .map(|(user_id, permissions)| UserPermissionsEntry {
            user_id,
            permissions,
        })
        .collect();
    Ok(Json(UserPermissionsResponse { entries }))
}

/// Roles carrying each of a batch of permission ids.
///
/// POST /authz/batch/permission-roles
pub async fn permission_roles_batch(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IdsRequest>,
) -> Result<Json<PermissionRolesResponse>, AppError> {
    let entries = state
        .batch
        .get_permission_roles_batch(&req.ids)
        .await?
        .into_iter()
        .map(|(permission_id, roles)| PermissionRolesEntry {
            permission_id,
            roles,
        })
        .collect();
    Ok(Json(PermissionRolesResponse { entries }))
}

/// Active groups for a batch of user ids.
///
/// POST /authz/batch/user-groups
pub async fn user_groups_batch(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IdsRequest>,
) -> Result<Json<UserGroupsResponse>, AppError> {
    let now = Utc::now();
    let entries = state
        .batch
        .get_user_groups_batch(&req.ids, now)
        .await?
        .into_iter()
        .map(|(user_id, groups)| UserGroupsEntry { user_id, groups })
        .collect();
    Ok(Json(UserGroupsResponse { entries }))
}
