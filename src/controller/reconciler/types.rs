//! # Types
//!
//! Core types for the reconciler.

use crate::attester::{ActiveAttester, AttesterRegistry, CompileError, PolicyCompiler, SignerBackend};
use crate::constants::{
    DEFAULT_REQUEUE_AFTER_WRITE_SECS, ERROR_BACKOFF_MAX_MINUTES, ERROR_BACKOFF_MIN_MINUTES,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::conditions::ConditionError;
use crate::controller::reconciler::secret::{SecretError, SecretLifecycleManager};
use crate::crd::ResourceKey;
use crate::store::{AttesterStore, SecretStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Condition(#[from] ConditionError),
}

impl ReconcilerError {
    /// Stable label for logs and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Store(_)
            | ReconcilerError::Condition(ConditionError::Store(_))
            | ReconcilerError::Secret(SecretError::Lookup { .. }) => "transient",
            ReconcilerError::Compile(_) => "compile",
            ReconcilerError::Secret(SecretError::Malformed { .. }) => "secret-parse",
            ReconcilerError::Secret(
                SecretError::Generate { .. } | SecretError::Create { .. },
            ) => "secret-create",
            ReconcilerError::Secret(SecretError::Delete { .. }) => "secret-delete",
            ReconcilerError::Condition(ConditionError::Uninitialized(_)) => "condition",
        }
    }
}

/// Why a pass stopped early after its own write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    /// Compiled moved to True
    PolicyCompiled,
    /// The secret reference was defaulted to the resource name
    SecretAssigned,
}

impl RequeueReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequeueReason::PolicyCompiled => "policy-compiled",
            RequeueReason::SecretAssigned => "secret-assigned",
        }
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged, or nothing left to do for this identity
    Done,
    /// Stopped after a write; run again shortly
    Requeue(RequeueReason),
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(
                Duration::from_secs(ERROR_BACKOFF_MIN_MINUTES * 60),
                Duration::from_secs(ERROR_BACKOFF_MAX_MINUTES * 60),
            ),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives Attester resources toward their desired state
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) attesters: Arc<dyn AttesterStore>,
    pub(crate) secrets: SecretLifecycleManager,
    pub(crate) compiler: Arc<dyn PolicyCompiler>,
    pub(crate) registry: AttesterRegistry,
    pub(crate) policy_trace: bool,
    requeue_after_write: Duration,
    // Keyed per resource so one failing Attester does not slow the others
    pub backoff_states: Arc<Mutex<HashMap<ResourceKey, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("active_attesters", &self.registry.len())
            .field("policy_trace", &self.policy_trace)
            .field("requeue_after_write", &self.requeue_after_write)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        attesters: Arc<dyn AttesterStore>,
        secrets: Arc<dyn SecretStore>,
        signers: Arc<dyn SignerBackend>,
        compiler: Arc<dyn PolicyCompiler>,
        registry: AttesterRegistry,
    ) -> Self {
        Self {
            attesters,
            secrets: SecretLifecycleManager::new(secrets, signers),
            compiler,
            registry,
            policy_trace: false,
            requeue_after_write: Duration::from_secs(DEFAULT_REQUEUE_AFTER_WRITE_SECS),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forward the trace flag to every policy compilation
    #[must_use]
    pub fn with_policy_trace(mut self, trace: bool) -> Self {
        self.policy_trace = trace;
        self
    }

    #[must_use]
    pub fn with_requeue_after_write(mut self, delay: Duration) -> Self {
        self.requeue_after_write = delay;
        self
    }

    #[must_use]
    pub fn requeue_after_write(&self) -> Duration {
        self.requeue_after_write
    }

    #[must_use]
    pub fn registry(&self) -> &AttesterRegistry {
        &self.registry
    }

    /// Every attester that finished its last pass with a compiled policy and a usable signer
    #[must_use]
    pub fn list_active_attesters(&self) -> HashMap<ResourceKey, Arc<ActiveAttester>> {
        self.registry.snapshot()
    }

    /// Clear error backoff for `key`; returns whether it had recorded errors
    pub fn reset_backoff(&self, key: &ResourceKey) -> bool {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match states.get_mut(key) {
            Some(state) => {
                let had_errors = state.error_count > 0;
                state.reset();
                had_errors
            }
            None => false,
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_error_backoff(&self, key: &ResourceKey) -> (Duration, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.clone()).or_default();
        state.increment_error();
        (state.backoff.next_backoff(), state.error_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attester::{Ed25519SignerBackend, RegoSourceCompiler};
    use crate::store::{MemoryAttesterStore, MemorySecretStore};

    fn reconciler() -> Reconciler {
        Reconciler::new(
            Arc::new(MemoryAttesterStore::new()),
            Arc::new(MemorySecretStore::new()),
            Arc::new(Ed25519SignerBackend),
            Arc::new(RegoSourceCompiler),
            AttesterRegistry::new(),
        )
    }

    #[test]
    fn test_error_backoff_is_per_resource() {
        let reconciler = reconciler();
        let a = ResourceKey::new("default", "a");
        let b = ResourceKey::new("default", "b");

        assert_eq!(reconciler.next_error_backoff(&a), (Duration::from_secs(60), 1));
        assert_eq!(reconciler.next_error_backoff(&a), (Duration::from_secs(60), 2));
        assert_eq!(reconciler.next_error_backoff(&a), (Duration::from_secs(120), 3));
        assert_eq!(reconciler.next_error_backoff(&b), (Duration::from_secs(60), 1));

        assert!(reconciler.reset_backoff(&a));
        assert!(!reconciler.reset_backoff(&a));
        assert_eq!(reconciler.next_error_backoff(&a), (Duration::from_secs(60), 1));
    }

    #[test]
    fn test_builder_settings() {
        let reconciler = reconciler()
            .with_policy_trace(true)
            .with_requeue_after_write(Duration::from_millis(250));
        assert!(reconciler.policy_trace);
        assert_eq!(reconciler.requeue_after_write(), Duration::from_millis(250));
        assert!(reconciler.list_active_attesters().is_empty());
    }

    #[test]
    fn test_error_kinds() {
        let key = ResourceKey::new("default", "scan");
        let err = ReconcilerError::from(StoreError::NotFound(key.clone()));
        assert_eq!(err.kind(), "transient");
        let err = ReconcilerError::from(ConditionError::Uninitialized(key));
        assert_eq!(err.kind(), "condition");
    }
}
