//! End-to-end decision engine tests against the in-memory store.
//!
//! These drive the full orchestration path (validate → RBAC → ABAC →
//! audit) the way the API surface does, without a live database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use authz_service::models::{ActivePolicy, PolicyEffect};
use authz_service::repo::MemoryStore;
use authz_service::services::{
    AbacEvaluator, AuditLogger, AuthorizationService, BatchService, CheckRequest,
    PermissionChecker, RoleResolver,
};

fn engine(store: &MemoryStore) -> AuthorizationService {
    let store: Arc<MemoryStore> = Arc::new(store.clone());
    AuthorizationService::new(
        RoleResolver::new(store.clone()),
        PermissionChecker::new(store.clone()),
        AbacEvaluator::new(store.clone()),
        AuditLogger::new(store),
    )
}

fn batch_service(store: &MemoryStore) -> BatchService {
    let store: Arc<MemoryStore> = Arc::new(store.clone());
    BatchService::new(store.clone(), RoleResolver::new(store))
}

fn check(user_id: Uuid, permission: &str) -> CheckRequest {
    CheckRequest {
        user_id: user_id.to_string(),
        permission: permission.to_string(),
        ..Default::default()
    }
}

fn attrs(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

async fn wait_for_audit(store: &MemoryStore, count: usize) {
    for _ in 0..200 {
        if store.audit_entries().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {} audit entries, found {}",
        count,
        store.audit_entries().len()
    );
}

/// Role `viewer` grants `transaction:read`; no policies exist for the
/// resource type, so the RBAC allow stands.
#[tokio::test]
async fn viewer_reads_transactions_when_no_policies_match() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);

    let decision = engine(&store)
        .check_permission(check(user, "transaction:read"))
        .await;

    assert!(decision.allowed);
    assert!(decision.reason.contains("no policies matched"));
}

/// A principal with no assignments is denied at the RBAC stage and the
/// policy store is never consulted.
#[tokio::test]
async fn principal_without_roles_is_denied_without_abac() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();

    let decision = engine(&store)
        .check_permission(check(user, "transaction:read"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, "User does not have permission");
    assert_eq!(store.policy_fetch_count(), 0);
}

/// An active DENY policy on the resource type overrides an RBAC allow when
/// its condition matches the supplied attributes.
#[tokio::test]
async fn deny_policy_overrides_rbac_allow() {
    let store = MemoryStore::new();
    let editor = store.add_role("editor");
    let update = store.add_permission("transaction:update");
    store.grant(editor.role_id, update.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, editor.role_id, None, None);

    store.add_policy(ActivePolicy::new(
        "no-self-service",
        Some("transaction"),
        PolicyEffect::Deny,
        "resource.ownerId == subject.userId",
    ));

    let mut request = check(user, "transaction:update");
    request.resource_type = Some("transaction".to_string());
    request.resource_attributes = Some(attrs(json!({ "ownerId": user })));

    let decision = engine(&store).check_permission(request).await;
    assert!(!decision.allowed);
    assert!(decision.reason.contains("ABAC policy explicitly denies access"));
}

/// Deny-override: a matched DENY wins even when an ALLOW also matched.
#[tokio::test]
async fn matched_deny_beats_matched_allow() {
    let store = MemoryStore::new();
    let editor = store.add_role("editor");
    let update = store.add_permission("transaction:update");
    store.grant(editor.role_id, update.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, editor.role_id, None, None);

    store.add_policy(ActivePolicy::new(
        "allow-editors",
        Some("transaction"),
        PolicyEffect::Allow,
        "subject.userId != 'nobody'",
    ));
    store.add_policy(ActivePolicy::new(
        "deny-everyone",
        Some("transaction"),
        PolicyEffect::Deny,
        "subject.userId != 'nobody'",
    ));

    let mut request = check(user, "transaction:update");
    request.resource_type = Some("transaction".to_string());

    let decision = engine(&store).check_permission(request).await;
    assert!(!decision.allowed);
    assert!(decision.reason.contains("deny-everyone"));
}

/// Case normalization happens before validation; a permission without a
/// colon never reaches the engine.
#[tokio::test]
async fn permission_normalization_and_shape_validation() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);

    let engine = engine(&store);

    let normalized = engine
        .check_permission(check(user, "Transaction:Read"))
        .await;
    assert!(normalized.allowed);

    let malformed = engine.check_permission(check(user, "transactionread")).await;
    assert!(!malformed.allowed);
    assert_eq!(malformed.reason, "Invalid input provided");
}

/// Validity windows: expired and not-yet-valid assignments contribute
/// nothing; an unbounded assignment always does.
#[tokio::test]
async fn assignment_windows_gate_the_effective_role_set() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);

    let expired = Uuid::new_v4();
    store.assign_role(
        expired,
        viewer.role_id,
        None,
        Some(now - chrono::Duration::hours(1)),
    );

    let future = Uuid::new_v4();
    store.assign_role(
        future,
        viewer.role_id,
        Some(now + chrono::Duration::hours(1)),
        None,
    );

    let permanent = Uuid::new_v4();
    store.assign_role(permanent, viewer.role_id, None, None);

    let engine = engine(&store);
    assert!(!engine
        .check_permission(check(expired, "transaction:read"))
        .await
        .allowed);
    assert!(!engine
        .check_permission(check(future, "transaction:read"))
        .await
        .allowed);
    assert!(engine
        .check_permission(check(permanent, "transaction:read"))
        .await
        .allowed);
}

/// Group-inherited roles act exactly like direct ones, and the union
/// deduplicates.
#[tokio::test]
async fn group_inheritance_feeds_the_effective_role_set() {
    let store = MemoryStore::new();
    let editor = store.add_role("editor");
    let update = store.add_permission("transaction:update");
    store.grant(editor.role_id, update.permission_id);

    let user = Uuid::new_v4();
    let team = store.add_group("ops");
    store.add_member(user, team.group_id, None);
    store.assign_group_role(team.group_id, editor.role_id, None, None);
    // Redundant direct assignment of the same role.
    store.assign_role(user, editor.role_id, None, None);

    let decision = engine(&store)
        .check_permission(check(user, "transaction:update"))
        .await;
    assert!(decision.allowed);

    wait_for_audit(&store, 1).await;
    let entry = &store.audit_entries()[0];
    assert_eq!(entry.role_ids, vec![editor.role_id]);
    assert_eq!(entry.group_ids, vec![team.group_id]);
}

/// Batch resolution: N ids with M invalid yields exactly N−M entries keyed
/// by the valid ids in first-occurrence order.
#[tokio::test]
async fn batch_resolution_drops_invalid_ids() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let viewer = store.add_role("viewer");
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    store.assign_role(a, viewer.role_id, None, None);

    let ids = vec![
        "garbage".to_string(),
        b.to_string(),
        "123".to_string(),
        a.to_string(),
    ];
    let result = batch_service(&store)
        .get_user_roles_batch(&ids, now)
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].0, b);
    assert!(result[0].1.is_empty());
    assert_eq!(result[1].0, a);
    assert_eq!(result[1].1.len(), 1);
}

/// Two identical checks over identical data produce identical decisions.
#[tokio::test]
async fn identical_checks_are_idempotent() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);
    store.add_policy(ActivePolicy::new(
        "allow-all-readers",
        Some("transaction"),
        PolicyEffect::Allow,
        "subject.userId != 'nobody'",
    ));

    let engine = engine(&store);
    let mut first_request = check(user, "transaction:read");
    first_request.resource_type = Some("transaction".to_string());
    let second_request = first_request.clone();

    let first = engine.check_permission(first_request).await;
    let second = engine.check_permission(second_request).await;
    assert_eq!(first, second);
}

/// Every terminal decision is audited exactly once, including validation
/// failures and read-layer failures, and an audit sink failure never
/// reverses a decision.
#[tokio::test]
async fn every_path_audits_exactly_once() {
    let store = MemoryStore::new();
    let viewer = store.add_role("viewer");
    let read = store.add_permission("transaction:read");
    store.grant(viewer.role_id, read.permission_id);
    let user = Uuid::new_v4();
    store.assign_role(user, viewer.role_id, None, None);

    let engine = engine(&store);

    // allow, rbac deny, validation deny
    engine.check_permission(check(user, "transaction:read")).await;
    engine
        .check_permission(check(Uuid::new_v4(), "transaction:read"))
        .await;
    engine
        .check_permission(check(user, "not a permission"))
        .await;

    // read-layer failure
    store.set_fail_reads(true);
    let failed = engine.check_permission(check(user, "transaction:read")).await;
    assert!(!failed.allowed);
    assert_eq!(
        failed.reason,
        "An error occurred while checking permission"
    );
    store.set_fail_reads(false);

    wait_for_audit(&store, 4).await;
    assert_eq!(store.audit_entries().len(), 4);

    // audit failure: decision unchanged, entry lost, counted
    store.set_fail_audit(true);
    let decision = engine.check_permission(check(user, "transaction:read")).await;
    assert!(decision.allowed);
}
