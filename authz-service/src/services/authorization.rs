//! Authorization orchestration.
//!
//! The decision protocol is a two-stage state machine with one terminal
//! decision per request:
//! - validate input at the boundary (no store calls yet),
//! - RBAC: resolve effective roles at a single captured `now`, check the
//!   permission; a deny short-circuits, ABAC is never consulted,
//! - ABAC: only after an RBAC allow; an explicit DENY policy overrides,
//!   no matching policy leaves the RBAC allow standing,
//! - audit exactly once on every path, including failures.
//!
//! Every internal failure resolves to DENY with a generic reason; detail
//! stays in server-side logs.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use uuid::Uuid;

use super::abac::{AbacEvaluator, AbacOutcome};
use super::audit::AuditLogger;
use super::error::{CheckFailure, REASON_INTERNAL_ERROR};
use super::metrics;
use super::permission::PermissionChecker;
use super::resolver::{ResolvedRoles, RoleResolver};
use crate::models::{AuthorizationAuditLogEntry, Permission, PolicyEffect};
use crate::repo::StoreError;

/// Maximum length accepted for free-text identifiers.
pub const MAX_TEXT_FIELD_LEN: usize = 1000;

/// Inbound permission check, untrusted and unnormalized.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub user_id: String,
    pub permission: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub scope_type: Option<String>,
    pub scope_id: Option<String>,
    pub subject_attributes: Option<Map<String, Value>>,
    pub resource_attributes: Option<Map<String, Value>>,
    pub context_attributes: Option<Map<String, Value>>,
    /// Correlation id propagated into audit metadata.
    pub request_id: Option<String>,
}

/// Terminal decision surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Optional scope dimension narrowing a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    Tenant,
    Profile,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Tenant => "tenant",
            ScopeType::Profile => "profile",
        }
    }
}

impl FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tenant" => Ok(ScopeType::Tenant),
            "profile" => Ok(ScopeType::Profile),
            _ => Err(format!("Invalid scope type: {}", s)),
        }
    }
}

/// Validated, normalized check context.
#[derive(Debug, Clone)]
struct CheckContext {
    user_id: Uuid,
    permission: String,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    scope_type: Option<ScopeType>,
    scope_id: Option<Uuid>,
    subject_attributes: Option<Map<String, Value>>,
    resource_attributes: Option<Map<String, Value>>,
    context_attributes: Option<Map<String, Value>>,
    request_id: Option<String>,
}

/// Result of the RBAC/ABAC stages, before audit assembly.
struct Evaluation {
    resolved: ResolvedRoles,
    rbac_allowed: bool,
    abac: Option<AbacOutcome>,
    decision: AuthorizationDecision,
    stage: &'static str,
}

/// Orchestrates RoleResolver → PermissionChecker → AbacEvaluator →
/// AuditLogger under the short-circuit, deny-override protocol. Stateless
/// across requests; safe to share and call concurrently.
#[derive(Clone)]
pub struct AuthorizationService {
    resolver: RoleResolver,
    checker: PermissionChecker,
    abac: AbacEvaluator,
    audit: AuditLogger,
}

impl AuthorizationService {
    pub fn new(
        resolver: RoleResolver,
        checker: PermissionChecker,
        abac: AbacEvaluator,
        audit: AuditLogger,
    ) -> Self {
        Self {
            resolver,
            checker,
            abac,
            audit,
        }
    }

    /// Decide whether the principal may perform `permission`. Always returns
    /// a terminal decision and audits it exactly once; never errors.
    pub async fn check_permission(&self, request: CheckRequest) -> AuthorizationDecision {
        // One timestamp for every validity-window comparison in this check.
        let now = Utc::now();

        let ctx = match validate(&request) {
            Ok(ctx) => ctx,
            Err(failure) => {
                tracing::warn!(
                    user_id = %request.user_id,
                    detail = %failure,
                    "Rejected malformed authorization request"
                );
                metrics::record_decision(false, failure.stage());
                self.audit.record(validation_audit_entry(&request));
                return AuthorizationDecision::deny(failure.public_reason());
            }
        };

        match self.evaluate(&ctx, now).await {
            Ok(evaluation) => {
                metrics::record_decision(evaluation.decision.allowed, evaluation.stage);
                self.audit.record(decision_audit_entry(&ctx, &evaluation));
                evaluation.decision
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = %ctx.user_id,
                    permission = %ctx.permission,
                    "Authorization check failed; denying"
                );
                metrics::record_decision(false, "resolution");
                self.audit.record(failure_audit_entry(&ctx));
                AuthorizationDecision::deny(REASON_INTERNAL_ERROR)
            }
        }
    }

    async fn evaluate(
        &self,
        ctx: &CheckContext,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, StoreError> {
        // Stage RBAC.
        let resolved = self.resolver.resolve(ctx.user_id, now).await?;
        let role_ids = resolved.role_ids();
        let rbac_allowed = self
            .checker
            .has_permission(&ctx.permission, &role_ids)
            .await?;

        if !rbac_allowed {
            return Ok(Evaluation {
                resolved,
                rbac_allowed: false,
                abac: None,
                decision: AuthorizationDecision::deny("User does not have permission"),
                stage: "rbac",
            });
        }

        // Stage ABAC.
        let subject = self.subject_attributes(ctx, &resolved);
        let resource = self.resource_attributes(ctx);
        let context = self.context_attributes(ctx);
        let outcome = self
            .abac
            .evaluate(
                ctx.resource_type.as_deref(),
                &subject,
                resource.as_ref(),
                context.as_ref(),
            )
            .await?;

        let decision = match outcome.decision {
            Some(PolicyEffect::Deny) => AuthorizationDecision::deny(outcome.reason.clone()),
            Some(PolicyEffect::Allow) => {
                AuthorizationDecision::allow("Access granted (ABAC policy allows)")
            }
            None => AuthorizationDecision::allow("Access granted (no policies matched)"),
        };

        Ok(Evaluation {
            resolved,
            rbac_allowed: true,
            abac: Some(outcome),
            decision,
            stage: "abac",
        })
    }

    /// Engine-computed subject attributes merged over caller-supplied ones;
    /// the engine's keys win so a caller cannot spoof its own identity.
    fn subject_attributes(
        &self,
        ctx: &CheckContext,
        resolved: &ResolvedRoles,
    ) -> Map<String, Value> {
        let mut attrs = ctx.subject_attributes.clone().unwrap_or_default();
        attrs.insert("userId".to_string(), json!(ctx.user_id));
        attrs.insert("roleIds".to_string(), json!(resolved.role_ids()));
        attrs.insert("roleNames".to_string(), json!(resolved.role_names()));
        attrs.insert("groupIds".to_string(), json!(resolved.group_ids));
        attrs
    }

    /// `None` when the request carried no resource context at all.
    fn resource_attributes(&self, ctx: &CheckContext) -> Option<Map<String, Value>> {
        if ctx.resource_type.is_none()
            && ctx.resource_id.is_none()
            && ctx.resource_attributes.is_none()
        {
            return None;
        }
        let mut attrs = ctx.resource_attributes.clone().unwrap_or_default();
        if let Some(resource_type) = &ctx.resource_type {
            attrs.insert("resourceType".to_string(), json!(resource_type));
        }
        if let Some(resource_id) = ctx.resource_id {
            attrs.insert("resourceId".to_string(), json!(resource_id));
        }
        Some(attrs)
    }

    /// Caller context passed through unchanged, with the normalized scope
    /// added under `scope` when one was supplied.
    fn context_attributes(&self, ctx: &CheckContext) -> Option<Map<String, Value>> {
        if ctx.context_attributes.is_none() && ctx.scope_type.is_none() {
            return None;
        }
        let mut attrs = ctx.context_attributes.clone().unwrap_or_default();
        if let Some(scope_type) = ctx.scope_type {
            attrs.insert(
                "scope".to_string(),
                json!({
                    "type": scope_type.as_str(),
                    "id": ctx.scope_id,
                }),
            );
        }
        Some(attrs)
    }
}

fn validate(request: &CheckRequest) -> Result<CheckContext, CheckFailure> {
    let user_id = Uuid::parse_str(request.user_id.trim())
        .map_err(|_| CheckFailure::Validation("user id is not a valid UUID"))?;

    let permission = Permission::normalize_name(&request.permission);
    if !Permission::is_valid_name(&permission) {
        return Err(CheckFailure::Validation(
            "permission does not match the resource:action shape",
        ));
    }

    let resource_type = match &request.resource_type {
        Some(raw) => {
            let normalized = raw.trim().to_lowercase();
            if normalized.len() > MAX_TEXT_FIELD_LEN {
                return Err(CheckFailure::Validation("resource type is too long"));
            }
            (!normalized.is_empty()).then_some(normalized)
        }
        None => None,
    };

    let resource_id = request
        .resource_id
        .as_deref()
        .map(|raw| {
            Uuid::parse_str(raw.trim())
                .map_err(|_| CheckFailure::Validation("resource id is not a valid UUID"))
        })
        .transpose()?;

    let scope_type = request
        .scope_type
        .as_deref()
        .map(|raw| {
            raw.parse::<ScopeType>()
                .map_err(|_| CheckFailure::Validation("unknown scope type"))
        })
        .transpose()?;

    let scope_id = request
        .scope_id
        .as_deref()
        .map(|raw| {
            Uuid::parse_str(raw.trim())
                .map_err(|_| CheckFailure::Validation("scope id is not a valid UUID"))
        })
        .transpose()?;

    Ok(CheckContext {
        user_id,
        permission,
        resource_type,
        resource_id,
        scope_type,
        scope_id,
        subject_attributes: request.subject_attributes.clone(),
        resource_attributes: request.resource_attributes.clone(),
        context_attributes: request.context_attributes.clone(),
        request_id: request.request_id.clone(),
    })
}

fn base_metadata(request_id: Option<&str>) -> Map<String, Value> {
    let mut metadata = Map::new();
    if let Some(request_id) = request_id {
        metadata.insert("requestId".to_string(), json!(request_id));
    }
    metadata
}

/// Audit entry for a request rejected at validation. The raw subject may
/// not parse as a UUID; a nil id plus the raw value in metadata keeps the
/// one-entry-per-request invariant without inventing an identity.
fn validation_audit_entry(request: &CheckRequest) -> AuthorizationAuditLogEntry {
    let user_id = Uuid::parse_str(request.user_id.trim()).unwrap_or(Uuid::nil());
    let mut metadata = base_metadata(request.request_id.as_deref());
    metadata.insert("failure".to_string(), json!("validation"));
    if user_id.is_nil() {
        metadata.insert("rawUserId".to_string(), json!(clip(&request.user_id)));
    }

    let requested_action: String = Permission::normalize_name(&request.permission)
        .chars()
        .take(255)
        .collect();

    AuthorizationAuditLogEntry::new(
        user_id,
        vec![],
        vec![],
        requested_action,
        request.resource_type.as_ref().map(|t| clip(t)),
        None,
        false,
        None,
        false,
        Value::Object(metadata),
    )
}

/// Audit entry for a check that failed in the read layer. Fail-closed: the
/// logged decision is DENY. Error detail stays in server logs, not here.
fn failure_audit_entry(ctx: &CheckContext) -> AuthorizationAuditLogEntry {
    let mut metadata = base_metadata(ctx.request_id.as_deref());
    metadata.insert("failure".to_string(), json!("resolution"));

    AuthorizationAuditLogEntry::new(
        ctx.user_id,
        vec![],
        vec![],
        ctx.permission.clone(),
        ctx.resource_type.clone(),
        ctx.resource_id,
        false,
        None,
        false,
        Value::Object(metadata),
    )
}

fn decision_audit_entry(ctx: &CheckContext, evaluation: &Evaluation) -> AuthorizationAuditLogEntry {
    let mut metadata = base_metadata(ctx.request_id.as_deref());
    if let Some(scope_type) = ctx.scope_type {
        metadata.insert("scopeType".to_string(), json!(scope_type.as_str()));
    }
    if let Some(scope_id) = ctx.scope_id {
        metadata.insert("scopeId".to_string(), json!(scope_id));
    }
    if let Some(outcome) = &evaluation.abac {
        metadata.insert(
            "matchedPolicies".to_string(),
            json!(outcome.matched_names()),
        );
    }
    metadata.insert("reason".to_string(), json!(evaluation.decision.reason));

    let abac_result = evaluation
        .abac
        .as_ref()
        .and_then(|outcome| outcome.decision)
        .map(|effect| effect == PolicyEffect::Allow);

    AuthorizationAuditLogEntry::new(
        ctx.user_id,
        evaluation.resolved.group_ids.clone(),
        evaluation.resolved.role_ids(),
        ctx.permission.clone(),
        ctx.resource_type.clone(),
        ctx.resource_id,
        evaluation.rbac_allowed,
        abac_result,
        evaluation.decision.allowed,
        Value::Object(metadata),
    )
}

fn clip(raw: &str) -> String {
    raw.chars().take(MAX_TEXT_FIELD_LEN).collect()
}
