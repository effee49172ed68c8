//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `attester_reconciliations_total` - Total number of reconciliation passes
//! - `attester_reconciliation_errors_total` - Total number of failed passes
//! - `attester_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `attester_requeues_total{reason}` - Requeues by reason
//! - `attester_policy_compile_errors_total` - Policies that failed to compile
//! - `attester_secrets_created_total` - Signing secrets created
//! - `attester_secret_delete_errors_total` - Failed secret deletions during teardown
//! - `attester_active_attesters` - Attesters currently in the registry

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "attester_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "attester_reconciliation_errors_total",
        "Total number of failed reconciliation passes",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "attester_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("attester_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static POLICY_COMPILE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "attester_policy_compile_errors_total",
        "Total number of policies that failed to compile",
    )
    .expect("Failed to create POLICY_COMPILE_ERRORS_TOTAL metric - this should never happen")
});

static SECRETS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "attester_secrets_created_total",
        "Total number of signing secrets created",
    )
    .expect("Failed to create SECRETS_CREATED_TOTAL metric - this should never happen")
});

static SECRET_DELETE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "attester_secret_delete_errors_total",
        "Total number of signing secrets that could not be deleted during teardown",
    )
    .expect("Failed to create SECRET_DELETE_ERRORS_TOTAL metric - this should never happen")
});

static ACTIVE_ATTESTERS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "attester_active_attesters",
        "Number of attesters currently ready to sign",
    )
    .expect("Failed to create ACTIVE_ATTESTERS metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only if a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLICY_COMPILE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_DELETE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_ATTESTERS.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_policy_compile_errors() {
    POLICY_COMPILE_ERRORS_TOTAL.inc();
}

pub fn increment_secrets_created() {
    SECRETS_CREATED_TOTAL.inc();
}

pub fn increment_secret_delete_errors() {
    SECRET_DELETE_ERRORS_TOTAL.inc();
}

pub fn set_active_attesters(count: usize) {
    ACTIVE_ATTESTERS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_counter_is_labelled_by_reason() {
        let before = REQUEUES_TOTAL.with_label_values(&["policy-compiled"]).get();
        increment_requeues_total("policy-compiled");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["policy-compiled"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_active_attesters_gauge_tracks_latest_value() {
        set_active_attesters(3);
        assert_eq!(ACTIVE_ATTESTERS.get(), 3);
        set_active_attesters(0);
        assert_eq!(ACTIVE_ATTESTERS.get(), 0);
    }
}
