//! # Reconcile
//!
//! One convergence pass for one Attester.
//!
//! Steps run strictly in order: load, finalizer registration, deletion,
//! condition initialization, policy compilation, secret reference
//! assignment, secret resolution, registry publish. Every step is idempotent
//! on its own, so a pass interrupted between any two steps is resumed by the
//! next one. Setting `Compiled=True` and assigning the secret reference each
//! end the pass so the next pass starts from a fresh read.

use crate::attester::ActiveAttester;
use crate::controller::reconciler::conditions;
use crate::controller::reconciler::finalizer;
use crate::controller::reconciler::secret::SecretError;
use crate::controller::reconciler::types::{
    ReconcileOutcome, Reconciler, ReconcilerError, RequeueReason,
};
use crate::crd::{Attester, ConditionStatus, ConditionType, ResourceKey};
use crate::observability;
use crate::store::StoreError;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Controller entry point: run a pass for the object the watch delivered
pub async fn reconcile(
    attester: Arc<Attester>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let Some(key) = ResourceKey::for_object(attester.as_ref()) else {
        warn!(
            name = attester.metadata.name.as_deref().unwrap_or("unknown"),
            "Ignoring Attester without a namespace"
        );
        return Ok(Action::await_change());
    };

    let outcome = ctx.reconcile_key(&key).await?;
    if ctx.reset_backoff(&key) {
        info!(attester = %key, "🔄 Backoff reset after successful pass");
    }

    match outcome {
        ReconcileOutcome::Done => Ok(Action::await_change()),
        ReconcileOutcome::Requeue(reason) => {
            observability::metrics::increment_requeues_total(reason.as_str());
            debug!(
                attester = %key,
                reason = reason.as_str(),
                delay = ?ctx.requeue_after_write(),
                "Requeueing after write"
            );
            Ok(Action::requeue(ctx.requeue_after_write()))
        }
    }
}

impl Reconciler {
    /// Run one pass for `key`
    pub async fn reconcile_key(
        &self,
        key: &ResourceKey,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = info_span!("reconcile", attester = %key);
        let start = Instant::now();
        observability::metrics::increment_reconciliations();

        let result = self.run_pass(key).instrument(span.clone()).await;

        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        observability::metrics::set_active_attesters(self.registry.len());
        span.in_scope(|| match &result {
            Ok(outcome) => debug!(
                ?outcome,
                duration = ?start.elapsed(),
                "Pass finished"
            ),
            Err(e) => warn!(error = %e, kind = e.kind(), "Pass failed"),
        });
        result
    }

    async fn run_pass(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ReconcilerError> {
        info!("Reconciling attester");

        let mut attester = match self.attesters.get(key).await {
            Ok(attester) => attester,
            Err(StoreError::NotFound(_)) => {
                if self.registry.remove(key) {
                    info!("Attester gone, dropped registry entry");
                } else {
                    debug!("Attester not found, nothing to do");
                }
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => {
                error!(error = %e, "Unable to load attester");
                return Err(e.into());
            }
        };

        finalizer::ensure_present(&*self.attesters, &mut attester).await?;

        if attester.is_deleting() {
            return self.finalize(key, attester).await;
        }

        conditions::initialize_conditions(&*self.attesters, &mut attester).await?;

        // Recompiled on every pass; the source may have changed
        let policy = match self
            .compiler
            .compile(&key.name, &attester.spec.policy, self.policy_trace)
        {
            Ok(policy) => policy,
            Err(err) => {
                warn!(error = %err, "Policy failed to compile");
                observability::metrics::increment_policy_compile_errors();
                self.withdraw(key);
                if let Err(status_err) = conditions::set_condition(
                    &*self.attesters,
                    &mut attester,
                    ConditionType::Compiled,
                    ConditionStatus::False,
                )
                .await
                {
                    warn!(error = %status_err, "Unable to set Compiled to False");
                }
                return Err(err.into());
            }
        };

        if conditions::set_condition(
            &*self.attesters,
            &mut attester,
            ConditionType::Compiled,
            ConditionStatus::True,
        )
        .await?
        {
            info!(package = policy.package(), "Policy compiled");
            return Ok(ReconcileOutcome::Requeue(RequeueReason::PolicyCompiled));
        }

        if attester.spec.pgp_secret.is_empty() {
            attester.spec.pgp_secret.clone_from(&key.name);
            self.attesters.update(&attester).await?;
            info!(secret = %key.name, "Defaulted secret reference to attester name");
            return Ok(ReconcileOutcome::Requeue(RequeueReason::SecretAssigned));
        }

        let secret_ref = attester.spec.pgp_secret.clone();
        let resolved = match self.secrets.resolve_or_create(key, &secret_ref).await {
            Ok(resolved) => resolved,
            Err(err @ SecretError::Lookup { .. }) => {
                error!(error = %err, "Unable to get the secret");
                return Err(err.into());
            }
            Err(err) => {
                error!(error = %err, "Signing secret unusable");
                self.withdraw(key);
                if let Err(status_err) = conditions::set_condition(
                    &*self.attesters,
                    &mut attester,
                    ConditionType::SecretReady,
                    ConditionStatus::False,
                )
                .await
                {
                    warn!(error = %status_err, "Unable to set SecretReady to False");
                }
                return Err(err.into());
            }
        };
        if resolved.created {
            observability::metrics::increment_secrets_created();
        }

        conditions::set_condition(
            &*self.attesters,
            &mut attester,
            ConditionType::SecretReady,
            ConditionStatus::True,
        )
        .await?;

        let key_id = resolved.signer.key_id().to_string();
        self.registry.publish(
            key.clone(),
            ActiveAttester::new(key.to_string(), policy, resolved.signer),
        );
        info!(%key_id, "Attester ready");
        Ok(ReconcileOutcome::Done)
    }

    /// Deletion branch: the finalizer is released before the secret is
    /// touched, so a failed cleanup can orphan a secret but never block deletion
    async fn finalize(
        &self,
        key: &ResourceKey,
        mut attester: Attester,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !attester.has_finalizer() {
            self.withdraw(key);
            debug!("Attester deleting without our finalizer");
            return Ok(ReconcileOutcome::Done);
        }

        info!("Attester deleted, cleaning up");
        finalizer::remove(&*self.attesters, &mut attester).await?;

        let secret_ref = attester.spec.pgp_secret.as_str();
        if secret_ref.is_empty() {
            debug!("No secret reference, skipping secret deletion");
        } else if let Err(err) = self.secrets.delete_secret(key, secret_ref).await {
            error!(error = %err, "Failed to delete the secret");
            observability::metrics::increment_secret_delete_errors();
        } else {
            info!(secret = secret_ref, "Deleted signing secret");
        }

        self.withdraw(key);
        Ok(ReconcileOutcome::Done)
    }

    fn withdraw(&self, key: &ResourceKey) {
        if self.registry.remove(key) {
            info!("Removed attester from registry");
        }
    }
}
