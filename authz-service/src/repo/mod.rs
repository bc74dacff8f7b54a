//! Read contracts consumed by the decision engine.
//!
//! The engine never owns persistence: it consults these narrow, read-only
//! traits and an append-only audit sink. Two implementations ship with the
//! service: [`PgStore`] (sqlx/Postgres) for production and [`MemoryStore`]
//! for tests and local development.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActivePolicy, AuthorizationAuditLogEntry, Group, GroupMembership, GroupRoleAssignment,
    Permission, Role, RoleAssignment,
};

/// Errors surfaced by the read layer. The engine treats every variant the
/// same way: fail closed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to role, group, and permission data.
///
/// The `*_for_users` variants exist so batch resolution can issue a constant
/// number of queries instead of one per principal.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn find_active_role_assignments(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError>;

    async fn find_active_role_assignments_for_users(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError>;

    async fn find_active_group_memberships(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupMembership>, StoreError>;

    async fn find_active_group_memberships_for_users(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupMembership>, StoreError>;

    async fn find_active_group_role_assignments(
        &self,
        group_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupRoleAssignment>, StoreError>;

    async fn find_roles_by_ids(&self, role_ids: &[Uuid]) -> Result<Vec<Role>, StoreError>;

    async fn find_groups_by_ids(&self, group_ids: &[Uuid]) -> Result<Vec<Group>, StoreError>;

    /// Existence check: does any of `role_ids` carry a permission whose name
    /// equals `permission_name` exactly.
    async fn permission_exists_for_roles(
        &self,
        permission_name: &str,
        role_ids: &[Uuid],
    ) -> Result<bool, StoreError>;

    /// All (role id, permission) pairs for the given roles.
    async fn find_permissions_for_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Permission)>, StoreError>;

    /// All (permission id, role) pairs for the given permissions.
    async fn find_roles_for_permissions(
        &self,
        permission_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Role)>, StoreError>;
}

/// Read-only access to ABAC policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Active policy versions applicable to `resource_type`: policies whose
    /// resource type matches, plus global policies (no resource type). The
    /// store guarantees at most one active version per policy.
    async fn find_active_policies_for_resource_type(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<ActivePolicy>, StoreError>;
}

/// Append-only audit sink. There is no read path back into the engine.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuthorizationAuditLogEntry) -> Result<(), StoreError>;
}
