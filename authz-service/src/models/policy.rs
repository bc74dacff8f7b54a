//! ABAC policy models.
//!
//! A policy has many versions but exactly one active version at a time.
//! The read contract only ever returns the joined policy + active version
//! view, so the engine never sees (or re-validates) inactive versions.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Effect carried by a policy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "policy_effect", rename_all = "UPPERCASE")]
pub enum PolicyEffect {
    Allow,
    Deny,
}

/// A policy joined with its single active version.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivePolicy {
    pub policy_id: Uuid,
    pub name: String,
    /// Resource type the policy applies to; `None` means the policy is
    /// global and applies to every check.
    pub resource_type: Option<String>,
    pub version: i32,
    pub effect: PolicyEffect,
    /// Boolean condition over dotted attribute paths, e.g.
    /// `subject.userId == resource.ownerId`.
    pub condition: String,
}

impl ActivePolicy {
    pub fn new(
        name: impl Into<String>,
        resource_type: Option<&str>,
        effect: PolicyEffect,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            policy_id: Uuid::new_v4(),
            name: name.into(),
            resource_type: resource_type.map(|s| s.to_string()),
            version: 1,
            effect,
            condition: condition.into(),
        }
    }
}
