//! Vectorized read paths for relationship-style resolution.
//!
//! Each method accepts raw id strings, parses them independently, and
//! answers with an ordered association list keyed by the valid ids in order
//! of first occurrence. Unparseable ids are logged and dropped; they never
//! appear in the output, not even as an empty entry. All reads are genuinely
//! batched: a constant number of store queries per call, never one per id.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::resolver::RoleResolver;
use crate::models::{Group, Permission, Role};
use crate::repo::{AccessStore, StoreError};

/// Batched read facets over the access store.
#[derive(Clone)]
pub struct BatchService {
    store: Arc<dyn AccessStore>,
    resolver: RoleResolver,
}

impl BatchService {
    pub fn new(store: Arc<dyn AccessStore>, resolver: RoleResolver) -> Self {
        Self { store, resolver }
    }

    /// Effective roles per user id.
    pub async fn get_user_roles_batch(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, Vec<Role>)>, StoreError> {
        let valid = parse_ids(ids);
        let resolved = self.resolver.resolve_batch(&valid, now).await?;
        let mut by_user: HashMap<Uuid, Vec<Role>> = resolved
            .into_iter()
            .map(|(user_id, r)| (user_id, r.roles))
            .collect();
        Ok(valid
            .into_iter()
            .map(|id| (id, by_user.remove(&id).unwrap_or_default()))
            .collect())
    }

    /// Effective permissions per user id, via the user's effective roles.
    pub async fn get_user_permissions_batch(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, Vec<Permission>)>, StoreError> {
        let valid = parse_ids(ids);
        let resolved = self.resolver.resolve_batch(&valid, now).await?;

        let all_role_ids: Vec<Uuid> = {
            let mut seen = HashSet::new();
            resolved
                .iter()
                .flat_map(|(_, r)| r.role_ids())
                .filter(|id| seen.insert(*id))
                .collect()
        };
        let by_role: HashMap<Uuid, Vec<Permission>> = if all_role_ids.is_empty() {
            HashMap::new()
        } else {
            let mut map: HashMap<Uuid, Vec<Permission>> = HashMap::new();
            for (role_id, permission) in
                self.store.find_permissions_for_roles(&all_role_ids).await?
            {
                map.entry(role_id).or_default().push(permission);
            }
            map
        };

        let mut permissions_by_user: HashMap<Uuid, Vec<Permission>> = resolved
            .into_iter()
            .map(|(user_id, r)| {
                let mut seen = HashSet::new();
                let permissions = r
                    .role_ids()
                    .iter()
                    .filter_map(|role_id| by_role.get(role_id))
                    .flatten()
                    .filter(|p| seen.insert(p.permission_id))
                    .cloned()
                    .collect();
                (user_id, permissions)
            })
            .collect();

        Ok(valid
            .into_iter()
            .map(|id| (id, permissions_by_user.remove(&id).unwrap_or_default()))
            .collect())
    }

    /// Roles that carry each permission id.
    pub async fn get_permission_roles_batch(
        &self,
        ids: &[String],
    ) -> Result<Vec<(Uuid, Vec<Role>)>, StoreError> {
        let valid = parse_ids(ids);
        let mut by_permission: HashMap<Uuid, Vec<Role>> = HashMap::new();
        if !valid.is_empty() {
            for (permission_id, role) in
                self.store.find_roles_for_permissions(&valid).await?
            {
                by_permission.entry(permission_id).or_default().push(role);
            }
        }
        Ok(valid
            .into_iter()
            .map(|id| (id, by_permission.remove(&id).unwrap_or_default()))
            .collect())
    }

    /// Active groups per user id.
    pub async fn get_user_groups_batch(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, Vec<Group>)>, StoreError> {
        let valid = parse_ids(ids);
        if valid.is_empty() {
            return Ok(Vec::new());
        }
        let memberships = self
            .store
            .find_active_group_memberships_for_users(&valid, now)
            .await?;

        let all_group_ids: Vec<Uuid> = {
            let mut seen = HashSet::new();
            memberships
                .iter()
                .map(|m| m.group_id)
                .filter(|id| seen.insert(*id))
                .collect()
        };
        let groups_by_id: HashMap<Uuid, Group> = if all_group_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find_groups_by_ids(&all_group_ids)
                .await?
                .into_iter()
                .map(|g| (g.group_id, g))
                .collect()
        };

        let mut by_user: HashMap<Uuid, Vec<Group>> = HashMap::new();
        for membership in &memberships {
            if let Some(group) = groups_by_id.get(&membership.group_id) {
                by_user
                    .entry(membership.user_id)
                    .or_default()
                    .push(group.clone());
            }
        }

        Ok(valid
            .into_iter()
            .map(|id| (id, by_user.remove(&id).unwrap_or_default()))
            .collect())
    }

    /// Single-item read path: effective roles for one user. An unparseable
    /// id answers with an empty collection rather than an error.
    pub async fn get_user_roles(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Role>, StoreError> {
        let Ok(user_id) = Uuid::parse_str(id.trim()) else {
            tracing::warn!(id = %id, "Ignoring unparseable user id");
            return Ok(Vec::new());
        };
        Ok(self.resolver.resolve(user_id, now).await?.roles)
    }

    /// Single-item read path: effective permissions for one user. An
    /// unparseable id answers with an empty collection, as above.
    pub async fn get_user_permissions(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Permission>, StoreError> {
        if Uuid::parse_str(id.trim()).is_err() {
            tracing::warn!(id = %id, "Ignoring unparseable user id");
            return Ok(Vec::new());
        }
        let mut result = self
            .get_user_permissions_batch(&[id.to_string()], now)
            .await?;
        Ok(result.pop().map(|(_, permissions)| permissions).unwrap_or_default())
    }
}

/// Parse each id independently; drop and log failures, collapse duplicates
/// to the first occurrence, preserve input order.
fn parse_ids(ids: &[String]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter_map(|raw| match Uuid::parse_str(raw.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(id = %raw, "Dropping unparseable id from batch request");
                None
            }
        })
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryStore;

    fn batch(store: &MemoryStore) -> BatchService {
        let store: Arc<MemoryStore> = Arc::new(store.clone());
        BatchService::new(store.clone(), RoleResolver::new(store))
    }

    #[tokio::test]
    async fn test_invalid_ids_are_dropped_not_empty() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let viewer = store.add_role("viewer");
        let user = Uuid::new_v4();
        store.assign_role(user, viewer.role_id, None, None);

        let ids = vec![
            user.to_string(),
            "not-a-uuid".to_string(),
            Uuid::new_v4().to_string(),
        ];
        let result = batch(&store).get_user_roles_batch(&ids, now).await.unwrap();

        // 3 in, 1 invalid out: exactly 2 entries, input order preserved.
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, user);
        assert_eq!(result[0].1.len(), 1);
        assert!(result[1].1.is_empty());
    }

    #[tokio::test]
    async fn test_first_occurrence_order_with_duplicates() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ids = vec![
            b.to_string(),
            a.to_string(),
            b.to_string(), // duplicate collapses to first occurrence
        ];
        let result = batch(&store).get_user_roles_batch(&ids, now).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, b);
        assert_eq!(result[1].0, a);
    }

    #[tokio::test]
    async fn test_user_permissions_batch_walks_groups() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let editor = store.add_role("editor");
        let update = store.add_permission("transaction:update");
        store.grant(editor.role_id, update.permission_id);

        let user = Uuid::new_v4();
        let team = store.add_group("team");
        store.add_member(user, team.group_id, None);
        store.assign_group_role(team.group_id, editor.role_id, None, None);

        let result = batch(&store)
            .get_user_permissions_batch(&[user.to_string()], now)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1.len(), 1);
        assert_eq!(result[0].1[0].name, "transaction:update");
    }

    #[tokio::test]
    async fn test_permission_roles_batch() {
        let store = MemoryStore::new();
        let viewer = store.add_role("viewer");
        let editor = store.add_role("editor");
        let read = store.add_permission("transaction:read");
        store.grant(viewer.role_id, read.permission_id);
        store.grant(editor.role_id, read.permission_id);

        let result = batch(&store)
            .get_permission_roles_batch(&[read.permission_id.to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_user_groups_batch_skips_lapsed_memberships() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = Uuid::new_v4();
        let active = store.add_group("active-team");
        let lapsed = store.add_group("old-team");
        store.add_member(user, active.group_id, None);
        store.add_member(
            user,
            lapsed.group_id,
            Some(now - chrono::Duration::hours(1)),
        );

        let result = batch(&store)
            .get_user_groups_batch(&[user.to_string()], now)
            .await
            .unwrap();
        assert_eq!(result[0].1.len(), 1);
        assert_eq!(result[0].1[0].name, "active-team");
    }

    #[tokio::test]
    async fn test_single_item_reads_answer_empty_for_bad_ids() {
        let store = MemoryStore::new();
        let service = batch(&store);
        let roles = service.get_user_roles("not-a-uuid", Utc::now()).await.unwrap();
        assert!(roles.is_empty());
        let permissions = service
            .get_user_permissions("not-a-uuid", Utc::now())
            .await
            .unwrap();
        assert!(permissions.is_empty());
    }
}
