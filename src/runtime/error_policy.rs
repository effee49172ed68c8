//! # Error Policy
//!
//! Requeue timing for failed passes. Each resource carries its own Fibonacci
//! backoff so one broken Attester does not delay the others.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{Attester, ResourceKey};
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

/// Handle reconciliation errors with Fibonacci backoff
pub fn handle_reconciliation_error(
    obj: Arc<Attester>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = ResourceKey::new(obj.namespace().unwrap_or_default(), obj.name_any());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        attester = %key,
        error.kind = error.kind(),
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "Reconciliation failed");
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = ctx.next_error_backoff(&key);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, next attempt: {})",
        delay.as_secs(),
        error_count,
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attester::{AttesterRegistry, Ed25519SignerBackend, RegoSourceCompiler};
    use crate::crd::AttesterSpec;
    use crate::store::{MemoryAttesterStore, MemorySecretStore, StoreError};
    use std::time::Duration;

    #[test]
    fn test_repeated_failures_back_off_per_resource() {
        let ctx = Arc::new(Reconciler::new(
            Arc::new(MemoryAttesterStore::new()),
            Arc::new(MemorySecretStore::new()),
            Arc::new(Ed25519SignerBackend),
            Arc::new(RegoSourceCompiler),
            AttesterRegistry::new(),
        ));
        let mut attester = Attester::new(
            "scan",
            AttesterSpec {
                policy: String::new(),
                pgp_secret: String::new(),
            },
        );
        attester.metadata.namespace = Some("default".to_string());
        let attester = Arc::new(attester);
        let key = ResourceKey::new("default", "scan");
        let error = ReconcilerError::from(StoreError::NotFound(key.clone()));

        let first = handle_reconciliation_error(attester.clone(), &error, ctx.clone());
        let second = handle_reconciliation_error(attester.clone(), &error, ctx.clone());
        let third = handle_reconciliation_error(attester, &error, ctx.clone());

        assert_eq!(first, Action::requeue(Duration::from_secs(60)));
        assert_eq!(second, Action::requeue(Duration::from_secs(60)));
        assert_eq!(third, Action::requeue(Duration::from_secs(120)));
        assert!(ctx.reset_backoff(&key));
    }
}
