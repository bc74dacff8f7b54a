//! PostgreSQL implementation of the read contracts.
//!
//! One query per contract call; the batched variants bind id slices with
//! `= ANY($n)` so resolution cost does not grow with the number of
//! principals being resolved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use super::{AccessStore, AuditSink, PolicyStore, StoreError};
use crate::models::{
    ActivePolicy, AuthorizationAuditLogEntry, Group, GroupMembership, GroupRoleAssignment,
    Permission, Role, RoleAssignment,
};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(
    url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(url)
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check database health.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Postgres-backed store implementing all three read contracts.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RolePermissionRow {
    role_id: Uuid,
    permission_id: Uuid,
    name: String,
    created_utc: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PermissionRoleRow {
    permission_id: Uuid,
    role_id: Uuid,
    name: String,
    description: Option<String>,
    created_utc: DateTime<Utc>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn find_active_role_assignments(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT assignment_id, user_id, role_id, valid_from, valid_until
            FROM role_assignments
            WHERE user_id = $1
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_until IS NULL OR valid_until >= $2)
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_active_role_assignments_for_users(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT assignment_id, user_id, role_id, valid_from, valid_until
            FROM role_assignments
            WHERE user_id = ANY($1)
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_until IS NULL OR valid_until >= $2)
            "#,
        )
        .bind(user_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_active_group_memberships(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let rows = sqlx::query_as::<_, GroupMembership>(
            r#"
            SELECT user_id, group_id, valid_until
            FROM group_memberships
            WHERE user_id = $1
              AND (valid_until IS NULL OR valid_until >= $2)
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_active_group_memberships_for_users(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let rows = sqlx::query_as::<_, GroupMembership>(
            r#"
            SELECT user_id, group_id, valid_until
            FROM group_memberships
            WHERE user_id = ANY($1)
              AND (valid_until IS NULL OR valid_until >= $2)
            "#,
        )
        .bind(user_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_active_group_role_assignments(
        &self,
        group_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupRoleAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, GroupRoleAssignment>(
            r#"
            SELECT group_id, role_id, valid_from, valid_until
            FROM group_role_assignments
            WHERE group_id = ANY($1)
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_until IS NULL OR valid_until >= $2)
            "#,
        )
        .bind(group_ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_roles_by_ids(&self, role_ids: &[Uuid]) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query_as::<_, Role>(
            r#"
            SELECT role_id, name, description, created_utc
            FROM roles
            WHERE role_id = ANY($1)
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_groups_by_ids(&self, group_ids: &[Uuid]) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query_as::<_, Group>(
            r#"
            SELECT group_id, name, created_utc
            FROM groups
            WHERE group_id = ANY($1)
            "#,
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn permission_exists_for_roles(
        &self,
        permission_name: &str,
        role_ids: &[Uuid],
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM role_permissions rp
                JOIN permissions p ON p.permission_id = rp.permission_id
                WHERE p.name = $1 AND rp.role_id = ANY($2)
            )
            "#,
        )
        .bind(permission_name)
        .bind(role_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_permissions_for_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Permission)>, StoreError> {
        let rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT rp.role_id, p.permission_id, p.name, p.created_utc
            FROM role_permissions rp
            JOIN permissions p ON p.permission_id = rp.permission_id
            WHERE rp.role_id = ANY($1)
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.role_id,
                    Permission {
                        permission_id: r.permission_id,
                        name: r.name,
                        created_utc: r.created_utc,
                    },
                )
            })
            .collect())
    }

    async fn find_roles_for_permissions(
        &self,
        permission_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Role)>, StoreError> {
        let rows = sqlx::query_as::<_, PermissionRoleRow>(
            r#"
            SELECT rp.permission_id, r.role_id, r.name, r.description, r.created_utc
            FROM role_permissions rp
            JOIN roles r ON r.role_id = rp.role_id
            WHERE rp.permission_id = ANY($1)
            "#,
        )
        .bind(permission_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.permission_id,
                    Role {
                        role_id: r.role_id,
                        name: r.name,
                        description: r.description,
                        created_utc: r.created_utc,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl PolicyStore for PgStore {
    async fn find_active_policies_for_resource_type(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<ActivePolicy>, StoreError> {
        // `resource_type = NULL` never matches, so a NULL bind returns only
        // global policies.
        let rows = sqlx::query_as::<_, ActivePolicy>(
            r#"
            SELECT p.policy_id, p.name, p.resource_type, v.version, v.effect, v.condition
            FROM abac_policies p
            JOIN abac_policy_versions v ON v.policy_id = p.policy_id AND v.is_active
            WHERE p.resource_type IS NULL OR p.resource_type = $1
            "#,
        )
        .bind(resource_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(&self, entry: &AuthorizationAuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO authorization_audit_log
                (entry_id, timestamp, user_id, group_ids, role_ids, requested_action,
                 resource_type, resource_id, rbac_result, abac_result, final_decision, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.timestamp)
        .bind(entry.user_id)
        .bind(&entry.group_ids)
        .bind(&entry.role_ids)
        .bind(&entry.requested_action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.rbac_result)
        .bind(entry.abac_result)
        .bind(&entry.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
