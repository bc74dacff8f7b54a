use service_core::error::AppError;
use thiserror::Error;

use crate::repo::StoreError;

/// Outward reason for any validation failure. Internal detail never crosses
/// the boundary.
pub const REASON_INVALID_INPUT: &str = "Invalid input provided";

/// Outward reason for any internal failure. Fail-closed, never fail-open.
pub const REASON_INTERNAL_ERROR: &str = "An error occurred while checking permission";

/// Closed set of ways a permission check can fail before producing a real
/// decision. Mapped exactly once, at the orchestrator boundary, to the two
/// generic outward reasons above.
#[derive(Debug, Error)]
pub enum CheckFailure {
    /// Malformed input; RBAC and ABAC are never invoked.
    #[error("invalid input: {0}")]
    Validation(&'static str),

    /// The read layer failed while resolving roles, groups, or policies.
    #[error("resolution failure: {0}")]
    Resolution(#[from] StoreError),
}

impl CheckFailure {
    /// The generic reason string surfaced to callers.
    pub fn public_reason(&self) -> &'static str {
        match self {
            CheckFailure::Validation(_) => REASON_INVALID_INPUT,
            CheckFailure::Resolution(_) => REASON_INTERNAL_ERROR,
        }
    }

    /// Metric/audit stage label.
    pub fn stage(&self) -> &'static str {
        match self {
            CheckFailure::Validation(_) => "validation",
            CheckFailure::Resolution(_) => "resolution",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}
