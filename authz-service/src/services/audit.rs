//! Audit logging for authorization decisions.
//!
//! Every decision is recorded, independent of outcome. The write is a side
//! effect only: a failed append is logged and counted, never propagated,
//! and never changes the decision the caller already holds.

use std::sync::Arc;

use super::metrics;
use crate::models::AuthorizationAuditLogEntry;
use crate::repo::AuditSink;

/// Fire-and-forget writer over an append-only sink.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record a decision without blocking the decision path.
    pub fn record(&self, entry: AuthorizationAuditLogEntry) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.append(&entry).await {
                metrics::record_audit_failure();
                tracing::error!(
                    error = %e,
                    user_id = %entry.user_id,
                    requested_action = %entry.requested_action,
                    "Failed to write authorization audit entry"
                );
            }
        });
    }

    /// Record a decision and wait for the append to finish. Sink errors are
    /// still swallowed and counted.
    pub async fn record_sync(&self, entry: AuthorizationAuditLogEntry) {
        if let Err(e) = self.sink.append(&entry).await {
            metrics::record_audit_failure();
            tracing::error!(
                error = %e,
                user_id = %entry.user_id,
                requested_action = %entry.requested_action,
                "Failed to write authorization audit entry"
            );
        }
    }
}
