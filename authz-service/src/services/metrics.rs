use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static AUTHZ_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static AUDIT_WRITE_FAILURES_TOTAL: OnceLock<IntCounter> = OnceLock::new();

pub fn init_metrics() {
    let registry = Registry::new();

    let decisions_total = match IntCounterVec::new(
        Opts::new(
            "authz_decisions_total",
            "Total number of authorization decisions",
        ),
        &["decision", "stage"],
    ) {
        Ok(metric) => metric,
        Err(e) => {
            tracing::error!("Failed to create authz_decisions_total metric: {}", e);
            panic!("Failed to initialize metrics: {}", e);
        }
    };

    let audit_failures = match IntCounter::new(
        "authz_audit_write_failures_total",
        "Total number of failed audit log writes",
    ) {
        Ok(metric) => metric,
        Err(e) => {
            tracing::error!(
                "Failed to create authz_audit_write_failures_total metric: {}",
                e
            );
            panic!("Failed to initialize metrics: {}", e);
        }
    };

    if let Err(e) = registry.register(Box::new(decisions_total.clone())) {
        tracing::error!("Failed to register authz_decisions_total collector: {}", e);
        panic!("Failed to initialize metrics: {}", e);
    }

    if let Err(e) = registry.register(Box::new(audit_failures.clone())) {
        tracing::error!(
            "Failed to register authz_audit_write_failures_total collector: {}",
            e
        );
        panic!("Failed to initialize metrics: {}", e);
    }

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = AUTHZ_DECISIONS_TOTAL.set(decisions_total);
    let _ = AUDIT_WRITE_FAILURES_TOTAL.set(audit_failures);
}

/// Count one terminal decision. `stage` names where it was reached:
/// validation, rbac, abac, or resolution.
pub fn record_decision(allowed: bool, stage: &str) {
    if let Some(counter) = AUTHZ_DECISIONS_TOTAL.get() {
        let decision = if allowed { "allow" } else { "deny" };
        counter.with_label_values(&[decision, stage]).inc();
    }
}

/// Count one failed audit write.
pub fn record_audit_failure() {
    if let Some(counter) = AUDIT_WRITE_FAILURES_TOTAL.get() {
        counter.inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("Metrics output was not valid UTF-8: {}", e);
            "# Metrics output was not valid UTF-8\n".to_string()
        }
    }
}
