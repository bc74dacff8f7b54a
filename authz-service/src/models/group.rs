//! Group models - memberships and group-level role assignments.
//!
//! Groups give principals inherited roles: an active membership plus an
//! active group-role assignment contributes that role to the member's
//! effective role set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Group entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Group {
    pub group_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl Group {
    /// Create a new group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            group_id: Uuid::new_v4(),
            name: name.into(),
            created_utc: Utc::now(),
        }
    }
}

/// Group membership. Only the end of the window is bounded; a membership
/// with no `valid_until` is permanent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupMembership {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub valid_until: Option<DateTime<Utc>>,
}

impl GroupMembership {
    pub fn new(user_id: Uuid, group_id: Uuid, valid_until: Option<DateTime<Utc>>) -> Self {
        Self {
            user_id,
            group_id,
            valid_until,
        }
    }

    /// Check if the membership is active at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map_or(true, |until| until >= now)
    }
}

/// Role assignment carried by a group, inherited by its active members.
/// Same validity rule as a direct assignment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupRoleAssignment {
    pub group_id: Uuid,
    pub role_id: Uuid,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl GroupRoleAssignment {
    pub fn new(
        group_id: Uuid,
        role_id: Uuid,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            group_id,
            role_id,
            valid_from,
            valid_until,
        }
    }

    /// Check if the group-role assignment is active at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= now)
            && self.valid_until.map_or(true, |until| until >= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_membership_without_end_is_active() {
        let m = GroupMembership::new(Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(m.is_active_at(Utc::now()));
    }

    #[test]
    fn test_lapsed_membership_is_inactive() {
        let now = Utc::now();
        let m = GroupMembership::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(now - Duration::minutes(5)),
        );
        assert!(!m.is_active_at(now));
    }

    #[test]
    fn test_group_role_assignment_window() {
        let now = Utc::now();
        let a = GroupRoleAssignment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(now - Duration::days(1)),
            Some(now + Duration::days(1)),
        );
        assert!(a.is_active_at(now));
        assert!(!a.is_active_at(now + Duration::days(2)));
    }
}
