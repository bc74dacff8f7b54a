//! Authorization audit log entry - immutable record of every decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a single authorization decision. Written once per
/// `check_permission` call regardless of outcome; never read back by the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationAuditLogEntry {
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: Uuid,
    pub group_ids: Vec<Uuid>,
    pub role_ids: Vec<Uuid>,
    pub requested_action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub rbac_result: bool,
    /// `None` when ABAC was never evaluated (RBAC denied, validation failed,
    /// or resolution failed).
    pub abac_result: Option<bool>,
    pub final_decision: bool,
    pub metadata: serde_json::Value,
}

impl AuthorizationAuditLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        group_ids: Vec<Uuid>,
        role_ids: Vec<Uuid>,
        requested_action: impl Into<String>,
        resource_type: Option<String>,
        resource_id: Option<Uuid>,
        rbac_result: bool,
        abac_result: Option<bool>,
        final_decision: bool,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id,
            group_ids,
            role_ids,
            requested_action: requested_action.into(),
            resource_type,
            resource_id,
            rbac_result,
            abac_result,
            final_decision,
            metadata,
        }
    }
}
