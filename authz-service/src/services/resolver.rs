//! Effective role resolution.
//!
//! The effective role set of a principal at an instant is the deduplicated
//! union of roles from active direct assignments and roles inherited through
//! active group memberships whose group-role assignments are active at the
//! same instant. Recomputed per check; nothing is cached.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Role;
use crate::repo::{AccessStore, StoreError};

/// Roles effective for one principal, plus the groups that contributed.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRoles {
    pub roles: Vec<Role>,
    pub group_ids: Vec<Uuid>,
}

impl ResolvedRoles {
    pub fn role_ids(&self) -> Vec<Uuid> {
        self.roles.iter().map(|r| r.role_id).collect()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Computes effective role sets from the read contracts.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn AccessStore>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Resolve the effective role set for one principal at `now`.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedRoles, StoreError> {
        let direct = self
            .store
            .find_active_role_assignments(user_id, now)
            .await?;
        let memberships = self
            .store
            .find_active_group_memberships(user_id, now)
            .await?;

        let group_ids = dedup_preserving_order(memberships.iter().map(|m| m.group_id));
        let inherited = if group_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .find_active_group_role_assignments(&group_ids, now)
                .await?
        };

        let role_ids = dedup_preserving_order(
            direct
                .iter()
                .map(|a| a.role_id)
                .chain(inherited.iter().map(|a| a.role_id)),
        );

        let roles = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.store.find_roles_by_ids(&role_ids).await?
        };

        Ok(ResolvedRoles { roles, group_ids })
    }

    /// Resolve effective role sets for many principals with a constant
    /// number of store calls. Principals with no active assignments or
    /// memberships are omitted from the result.
    pub async fn resolve_batch(
        &self,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, ResolvedRoles)>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = self
            .store
            .find_active_role_assignments_for_users(user_ids, now)
            .await?;
        let memberships = self
            .store
            .find_active_group_memberships_for_users(user_ids, now)
            .await?;

        let all_group_ids = dedup_preserving_order(memberships.iter().map(|m| m.group_id));
        let group_assignments = if all_group_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .find_active_group_role_assignments(&all_group_ids, now)
                .await?
        };

        let mut roles_by_group: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for assignment in &group_assignments {
            roles_by_group
                .entry(assignment.group_id)
                .or_default()
                .push(assignment.role_id);
        }

        // Per-principal role id sets, direct first, then group-inherited.
        let mut role_ids_by_user: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut group_ids_by_user: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for assignment in &assignments {
            role_ids_by_user
                .entry(assignment.user_id)
                .or_default()
                .push(assignment.role_id);
        }
        for membership in &memberships {
            group_ids_by_user
                .entry(membership.user_id)
                .or_default()
                .push(membership.group_id);
            if let Some(inherited) = roles_by_group.get(&membership.group_id) {
                role_ids_by_user
                    .entry(membership.user_id)
                    .or_default()
                    .extend(inherited.iter().copied());
            }
        }

        let all_role_ids = dedup_preserving_order(
            role_ids_by_user.values().flatten().copied(),
        );
        let roles_by_id: HashMap<Uuid, Role> = if all_role_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find_roles_by_ids(&all_role_ids)
                .await?
                .into_iter()
                .map(|r| (r.role_id, r))
                .collect()
        };

        let mut resolved = Vec::new();
        for user_id in dedup_preserving_order(user_ids.iter().copied()) {
            let role_ids = match role_ids_by_user.get(&user_id) {
                Some(ids) => dedup_preserving_order(ids.iter().copied()),
                None => {
                    if !group_ids_by_user.contains_key(&user_id) {
                        continue;
                    }
                    Vec::new()
                }
            };
            let roles = role_ids
                .iter()
                .filter_map(|id| roles_by_id.get(id).cloned())
                .collect();
            let group_ids = group_ids_by_user
                .get(&user_id)
                .map(|ids| dedup_preserving_order(ids.iter().copied()))
                .unwrap_or_default();
            resolved.push((user_id, ResolvedRoles { roles, group_ids }));
        }
        Ok(resolved)
    }
}

fn dedup_preserving_order(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryStore;
    use chrono::Duration;

    fn resolver(store: &MemoryStore) -> RoleResolver {
        RoleResolver::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_direct_and_inherited_roles_are_unioned() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let viewer = store.add_role("viewer");
        let editor = store.add_role("editor");
        let user = Uuid::new_v4();
        let team = store.add_group("team");

        store.assign_role(user, viewer.role_id, None, None);
        store.add_member(user, team.group_id, None);
        store.assign_group_role(team.group_id, editor.role_id, None, None);

        let resolved = resolver(&store).resolve(user, now).await.unwrap();
        let mut names = resolved.role_names();
        names.sort();
        assert_eq!(names, vec!["editor", "viewer"]);
        assert_eq!(resolved.group_ids, vec![team.group_id]);
    }

    #[tokio::test]
    async fn test_duplicate_roles_collapse() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let viewer = store.add_role("viewer");
        let user = Uuid::new_v4();
        let team = store.add_group("team");

        // Same role direct and via group.
        store.assign_role(user, viewer.role_id, None, None);
        store.add_member(user, team.group_id, None);
        store.assign_group_role(team.group_id, viewer.role_id, None, None);

        let resolved = resolver(&store).resolve(user, now).await.unwrap();
        assert_eq!(resolved.roles.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_assignment_does_not_contribute() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let viewer = store.add_role("viewer");
        let user = Uuid::new_v4();

        store.assign_role(user, viewer.role_id, None, Some(now - Duration::hours(1)));

        let resolved = resolver(&store).resolve(user, now).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_lapsed_membership_blocks_inheritance() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let editor = store.add_role("editor");
        let user = Uuid::new_v4();
        let team = store.add_group("team");

        store.add_member(user, team.group_id, Some(now - Duration::minutes(1)));
        store.assign_group_role(team.group_id, editor.role_id, None, None);

        let resolved = resolver(&store).resolve(user, now).await.unwrap();
        assert!(resolved.is_empty());
        assert!(resolved.group_ids.is_empty());
    }

    #[tokio::test]
    async fn test_batch_omits_principals_without_data() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let viewer = store.add_role("viewer");
        let with_role = Uuid::new_v4();
        let without = Uuid::new_v4();

        store.assign_role(with_role, viewer.role_id, None, None);

        let resolved = resolver(&store)
            .resolve_batch(&[with_role, without], now)
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, with_role);
    }

    #[tokio::test]
    async fn test_batch_matches_single_resolution() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let viewer = store.add_role("viewer");
        let editor = store.add_role("editor");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let team = store.add_group("team");

        store.assign_role(a, viewer.role_id, None, None);
        store.add_member(a, team.group_id, None);
        store.add_member(b, team.group_id, None);
        store.assign_group_role(team.group_id, editor.role_id, None, None);

        let single_a = resolver(&store).resolve(a, now).await.unwrap();
        let single_b = resolver(&store).resolve(b, now).await.unwrap();
        let batch = resolver(&store).resolve_batch(&[a, b], now).await.unwrap();

        let batch_a = &batch.iter().find(|(id, _)| *id == a).unwrap().1;
        let batch_b = &batch.iter().find(|(id, _)| *id == b).unwrap().1;
        assert_eq!(
            sorted(single_a.role_ids()),
            sorted(batch_a.role_ids())
        );
        assert_eq!(
            sorted(single_b.role_ids()),
            sorted(batch_b.role_ids())
        );
    }

    fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
        ids.sort();
        ids
    }
}
