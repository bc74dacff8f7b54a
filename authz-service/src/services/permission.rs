//! Permission existence check against a role set.

use std::sync::Arc;
use uuid::Uuid;

use crate::repo::{AccessStore, StoreError};

/// Pure existence check: does any role in the set carry the permission.
/// Assumes the permission name is already canonical (trimmed, lowercased);
/// normalization happens once at the service boundary.
#[derive(Clone)]
pub struct PermissionChecker {
    store: Arc<dyn AccessStore>,
}

impl PermissionChecker {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Exact-match check, no prefix or pattern semantics. An empty role set
    /// short-circuits without touching the store.
    pub async fn has_permission(
        &self,
        permission_name: &str,
        role_ids: &[Uuid],
    ) -> Result<bool, StoreError> {
        if role_ids.is_empty() {
            return Ok(false);
        }
        self.store
            .permission_exists_for_roles(permission_name, role_ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryStore;

    #[tokio::test]
    async fn test_granted_permission_is_found() {
        let store = MemoryStore::new();
        let role = store.add_role("viewer");
        let permission = store.add_permission("transaction:read");
        store.grant(role.role_id, permission.permission_id);

        let checker = PermissionChecker::new(Arc::new(store));
        assert!(checker
            .has_permission("transaction:read", &[role.role_id])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_no_partial_matching() {
        let store = MemoryStore::new();
        let role = store.add_role("viewer");
        let permission = store.add_permission("transaction:read");
        store.grant(role.role_id, permission.permission_id);

        let checker = PermissionChecker::new(Arc::new(store));
        assert!(!checker
            .has_permission("transaction:rea", &[role.role_id])
            .await
            .unwrap());
        assert!(!checker
            .has_permission("transaction", &[role.role_id])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_empty_role_set_short_circuits() {
        let store = MemoryStore::new();
        store.set_fail_reads(true); // would error if the store were consulted

        let checker = PermissionChecker::new(Arc::new(store));
        assert!(!checker
            .has_permission("transaction:read", &[])
            .await
            .unwrap());
    }
}
