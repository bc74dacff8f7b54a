//! Services layer for authz-service.
//!
//! The decision engine proper: role resolution, permission checks, ABAC
//! evaluation, orchestration, batching, and audit wiring.

mod abac;
mod audit;
mod authorization;
mod batch;
pub mod condition;
pub mod error;
pub mod metrics;
mod permission;
mod resolver;

pub use abac::{AbacEvaluator, AbacOutcome, PolicyRef};
pub use audit::AuditLogger;
pub use authorization::{
    AuthorizationDecision, AuthorizationService, CheckRequest, ScopeType, MAX_TEXT_FIELD_LEN,
};
pub use batch::BatchService;
pub use error::{CheckFailure, REASON_INTERNAL_ERROR, REASON_INVALID_INPUT};
pub use permission::PermissionChecker;
pub use resolver::{ResolvedRoles, RoleResolver};
