//! Role assignment model - time-bounded user→role assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Direct role assignment entity. Both window bounds optional; a fully
/// unbounded assignment is permanent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleAssignment {
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Create a permanent assignment.
    pub fn new(user_id: Uuid, role_id: Uuid) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            user_id,
            role_id,
            valid_from: None,
            valid_until: None,
        }
    }

    /// Create an assignment with an explicit validity window.
    pub fn new_with_window(
        user_id: Uuid,
        role_id: Uuid,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            user_id,
            role_id,
            valid_from,
            valid_until,
        }
    }

    /// Check if the assignment is active at `now`.
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
    fn test_unbounded_assignment_is_always_active() {
        let a = RoleAssignment::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(a.is_active_at(Utc::now()));
    }

    #[test]
    fn test_expired_assignment_is_inactive() {
        let now = Utc::now();
        let a = RoleAssignment::new_with_window(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            Some(now - Duration::hours(1)),
        );
        assert!(!a.is_active_at(now));
    }

    #[test]
    fn test_future_assignment_is_inactive() {
        let now = Utc::now();
        let a = RoleAssignment::new_with_window(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(now + Duration::hours(1)),
            None,
        );
        assert!(!a.is_active_at(now));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let now = Utc::now();
        let a = RoleAssignment::new_with_window(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(now),
            Some(now),
        );
        assert!(a.is_active_at(now));
    }
}
