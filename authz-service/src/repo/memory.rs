//! In-memory implementation of the read contracts.
//!
//! Backs unit and integration tests and local development. Failure
//! injection flags let tests drive the fail-closed and audit-failure
//! paths; the policy fetch counter lets tests assert the RBAC
//! short-circuit (ABAC never consulted on an RBAC deny).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{AccessStore, AuditSink, PolicyStore, StoreError};
use crate::models::{
    ActivePolicy, AuthorizationAuditLogEntry, Group, GroupMembership, GroupRoleAssignment,
    Permission, Role, RoleAssignment,
};

#[derive(Default)]
struct Inner {
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    role_permissions: Vec<(Uuid, Uuid)>,
    role_assignments: Vec<RoleAssignment>,
    groups: Vec<Group>,
    group_memberships: Vec<GroupMembership>,
    group_role_assignments: Vec<GroupRoleAssignment>,
    policies: Vec<ActivePolicy>,
    audit_entries: Vec<AuthorizationAuditLogEntry>,
}

/// Shared, clonable in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    fail_reads: Arc<AtomicBool>,
    fail_audit: Arc<AtomicBool>,
    policy_fetches: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn add_role(&self, name: &str) -> Role {
        let role = Role::new(name);
        self.inner.write().unwrap().roles.push(role.clone());
        role
    }

    pub fn add_permission(&self, name: &str) -> Permission {
        let permission = Permission::new(name);
        self.inner
            .write()
            .unwrap()
            .permissions
            .push(permission.clone());
        permission
    }

    /// Grant a permission to a role.
    pub fn grant(&self, role_id: Uuid, permission_id: Uuid) {
        self.inner
            .write()
            .unwrap()
            .role_permissions
            .push((role_id, permission_id));
    }

    pub fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> RoleAssignment {
        let assignment = RoleAssignment::new_with_window(user_id, role_id, valid_from, valid_until);
        self.inner
            .write()
            .unwrap()
            .role_assignments
            .push(assignment.clone());
        assignment
    }

    pub fn add_group(&self, name: &str) -> Group {
        let group = Group::new(name);
        self.inner.write().unwrap().groups.push(group.clone());
        group
    }

    pub fn add_member(&self, user_id: Uuid, group_id: Uuid, valid_until: Option<DateTime<Utc>>) {
        self.inner
            .write()
            .unwrap()
            .group_memberships
            .push(GroupMembership::new(user_id, group_id, valid_until));
    }

    pub fn assign_group_role(
        &self,
        group_id: Uuid,
        role_id: Uuid,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) {
        self.inner
            .write()
            .unwrap()
            .group_role_assignments
            .push(GroupRoleAssignment::new(
                group_id, role_id, valid_from, valid_until,
            ));
    }

    pub fn add_policy(&self, policy: ActivePolicy) {
        self.inner.write().unwrap().policies.push(policy);
    }

    // ------------------------------------------------------------------
    // Test instrumentation
    // ------------------------------------------------------------------

    /// Make every read call fail until cleared.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make audit appends fail until cleared.
    pub fn set_fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Number of policy fetches issued so far.
    pub fn policy_fetch_count(&self) -> usize {
        self.policy_fetches.load(Ordering::SeqCst)
    }

    /// Snapshot of the audit log.
    pub fn audit_entries(&self) -> Vec<AuthorizationAuditLogEntry> {
        self.inner.read().unwrap().audit_entries.clone()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn find_active_role_assignments(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        self.find_active_role_assignments_for_users(&[user_id], now)
            .await
    }

    async fn find_active_role_assignments_for_users(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        self.check_reads()?;
        Ok(self
            .inner
            .read()
            .unwrap()
            .role_assignments
            .iter()
            .filter(|a| user_ids.contains(&a.user_id) && a.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn find_active_group_memberships(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        self.find_active_group_memberships_for_users(&[user_id], now)
            .await
    }

    async fn find_active_group_memberships_for_users(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        self.check_reads()?;
        Ok(self
            .inner
            .read()
            .unwrap()
            .group_memberships
            .iter()
            .filter(|m| user_ids.contains(&m.user_id) && m.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn find_active_group_role_assignments(
        &self,
        group_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<GroupRoleAssignment>, StoreError> {
        self.check_reads()?;
        Ok(self
            .inner
            .read()
            .unwrap()
            .group_role_assignments
            .iter()
            .filter(|a| group_ids.contains(&a.group_id) && a.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn find_roles_by_ids(&self, role_ids: &[Uuid]) -> Result<Vec<Role>, StoreError> {
        self.check_reads()?;
        Ok(self
            .inner
            .read()
            .unwrap()
            .roles
            .iter()
            .filter(|r| role_ids.contains(&r.role_id))
            .cloned()
            .collect())
    }

    async fn find_groups_by_ids(&self, group_ids: &[Uuid]) -> Result<Vec<Group>, StoreError> {
        self.check_reads()?;
        Ok(self
            .inner
            .read()
            .unwrap()
            .groups
            .iter()
            .filter(|g| group_ids.contains(&g.group_id))
            .cloned()
            .collect())
    }

    async fn permission_exists_for_roles(
        &self,
        permission_name: &str,
        role_ids: &[Uuid],
    ) -> Result<bool, StoreError> {
        self.check_reads()?;
        let inner = self.inner.read().unwrap();
        let permission_ids: Vec<Uuid> = inner
            .permissions
            .iter()
            .filter(|p| p.name == permission_name)
            .map(|p| p.permission_id)
            .collect();
        Ok(inner.role_permissions.iter().any(|(role_id, permission_id)| {
            role_ids.contains(role_id) && permission_ids.contains(permission_id)
        }))
    }

    async fn find_permissions_for_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Permission)>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.read().unwrap();
        Ok(inner
            .role_permissions
            .iter()
            .filter(|(role_id, _)| role_ids.contains(role_id))
            .filter_map(|(role_id, permission_id)| {
                inner
                    .permissions
                    .iter()
                    .find(|p| p.permission_id == *permission_id)
                    .map(|p| (*role_id, p.clone()))
            })
            .collect())
    }

    async fn find_roles_for_permissions(
        &self,
        permission_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Role)>, StoreError> {
        self.check_reads()?;
        let inner = self.inner.read().unwrap();
        Ok(inner
            .role_permissions
            .iter()
            .filter(|(_, permission_id)| permission_ids.contains(permission_id))
            .filter_map(|(role_id, permission_id)| {
                inner
                    .roles
                    .iter()
                    .find(|r| r.role_id == *role_id)
                    .map(|r| (*permission_id, r.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn find_active_policies_for_resource_type(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<ActivePolicy>, StoreError> {
        self.policy_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        Ok(self
            .inner
            .read()
            .unwrap()
            .policies
            .iter()
            .filter(|p| {
                p.resource_type.is_none() || p.resource_type.as_deref() == resource_type
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: &AuthorizationAuditLogEntry) -> Result<(), StoreError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected audit failure".into()));
        }
        self.inner
            .write()
            .unwrap()
            .audit_entries
            .push(entry.clone());
        Ok(())
    }
}
