//! Attribute-based policy evaluation.
//!
//! Matches active policies against subject/resource/context attribute maps
//! and combines the matched effects with deny-override. Never consults
//! RBAC; stateless per call.

use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::condition::{self, AttributeMaps};
use crate::models::PolicyEffect;
use crate::repo::{PolicyStore, StoreError};

/// Reference to a policy that matched, for audit and reasons.
#[derive(Debug, Clone)]
pub struct PolicyRef {
    pub policy_id: Uuid,
    pub name: String,
    pub effect: PolicyEffect,
}

/// Combined outcome of one evaluation pass.
#[derive(Debug, Clone)]
pub struct AbacOutcome {
    /// `None` means no applicable policy matched, which is not a denial.
    pub decision: Option<PolicyEffect>,
    pub matched: Vec<PolicyRef>,
    pub reason: String,
}

impl AbacOutcome {
    pub fn matched_names(&self) -> Vec<String> {
        self.matched.iter().map(|p| p.name.clone()).collect()
    }
}

/// Evaluates active ABAC policies for a resource type.
#[derive(Clone)]
pub struct AbacEvaluator {
    policies: Arc<dyn PolicyStore>,
}

impl AbacEvaluator {
    pub fn new(policies: Arc<dyn PolicyStore>) -> Self {
        Self { policies }
    }

    /// Evaluate all active policies applicable to `resource_type` against
    /// the attribute maps.
    ///
    /// Effect combination over the matched set: any DENY wins over any
    /// number of ALLOWs; no match at all yields no decision. A stored
    /// condition that fails to parse is logged and treated as not matched.
    pub async fn evaluate(
        &self,
        resource_type: Option<&str>,
        subject: &Map<String, Value>,
        resource: Option<&Map<String, Value>>,
        context: Option<&Map<String, Value>>,
    ) -> Result<AbacOutcome, StoreError> {
        let policies = self
            .policies
            .find_active_policies_for_resource_type(resource_type)
            .await?;

        let attrs = AttributeMaps {
            subject,
            resource,
            context,
        };

        let mut matched = Vec::new();
        for policy in &policies {
            let parsed = match condition::parse(&policy.condition) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        policy_id = %policy.policy_id,
                        policy = %policy.name,
                        error = %e,
                        "Skipping ABAC policy with unparseable condition"
                    );
                    continue;
                }
            };
            if parsed.evaluate(&attrs) {
                matched.push(PolicyRef {
                    policy_id: policy.policy_id,
                    name: policy.name.clone(),
                    effect: policy.effect,
                });
            }
        }

        let denies: Vec<&PolicyRef> = matched
            .iter()
            .filter(|p| p.effect == PolicyEffect::Deny)
            .collect();

        let (decision, reason) = if !denies.is_empty() {
            let names: Vec<&str> = denies.iter().map(|p| p.name.as_str()).collect();
            (
                Some(PolicyEffect::Deny),
                format!(
                    "ABAC policy explicitly denies access ({})",
                    names.join(", ")
                ),
            )
        } else if !matched.is_empty() {
            let names: Vec<&str> = matched.iter().map(|p| p.name.as_str()).collect();
            (
                Some(PolicyEffect::Allow),
                format!("ABAC policy allows access ({})", names.join(", ")),
            )
        } else {
            (None, "no policies matched".to_string())
        };

        Ok(AbacOutcome {
            decision,
            matched,
            reason,
        })
    }
}
