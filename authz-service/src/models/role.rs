//! Role and permission models.
//!
//! Key principle: a permission name is always `resource:action`, lowercase.
//! Normalization happens once at the service boundary; everything below it
//! assumes the canonical form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Maximum length of a permission name.
pub const MAX_PERMISSION_NAME_LEN: usize = 255;

/// Role entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Role {
    pub role_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    /// Create a new role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            created_utc: Utc::now(),
        }
    }
}

/// Permission entity, named `resource:action`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Permission {
    pub permission_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            name: name.into(),
            created_utc: Utc::now(),
        }
    }

    /// Canonicalize a raw permission string: trim and lowercase.
    pub fn normalize_name(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    /// Check a canonical permission name against the `resource:action` shape:
    /// both halves non-empty, characters limited to `[a-z0-9_-]`.
    pub fn is_valid_name(name: &str) -> bool {
        if name.is_empty() || name.len() > MAX_PERMISSION_NAME_LEN {
            return false;
        }
        let Some((resource, action)) = name.split_once(':') else {
            return false;
        };
        if resource.is_empty() || action.is_empty() {
            return false;
        }
        resource.chars().chain(action.chars()).all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-')
        })
    }
}
