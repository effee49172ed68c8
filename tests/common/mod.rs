//! Common test utilities for reconciler integration tests
//!
//! Builds a `Reconciler` over in-memory stores and provides Attester fixtures.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use attester_controller::prelude::*;
use attester_controller::attester::KeyMaterial;
use attester_controller::store::{MemoryAttesterStore, MemorySecretStore, SecretRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const VALID_POLICY: &str = r#"package rode.image_scan

default allow = false

allow {
    count(input.violations) == 0
}
"#;

/// Missing the closing brace of `allow`
pub const INVALID_POLICY: &str = "package rode.image_scan\n\nallow {\n    count(input.violations) == 0\n";

const MAX_PASSES: usize = 10;

pub fn attester(name: &str, policy: &str, pgp_secret: &str) -> Attester {
    let mut attester = Attester::new(
        name,
        AttesterSpec {
            policy: policy.to_string(),
            pgp_secret: pgp_secret.to_string(),
        },
    );
    attester.metadata.namespace = Some("default".to_string());
    attester
}

pub struct Harness {
    pub attesters: MemoryAttesterStore,
    pub secrets: MemorySecretStore,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|reconciler| reconciler)
    }

    pub fn with(configure: impl FnOnce(Reconciler) -> Reconciler) -> Self {
        Self::build(|secrets| Arc::new(secrets) as Arc<dyn SecretStore>, configure)
    }

    /// Put a wrapper between the reconciler and the shared secret store
    pub fn with_secret_store(wrap: impl FnOnce(MemorySecretStore) -> Arc<dyn SecretStore>) -> Self {
        Self::build(wrap, |reconciler| reconciler)
    }

    fn build(
        wrap: impl FnOnce(MemorySecretStore) -> Arc<dyn SecretStore>,
        configure: impl FnOnce(Reconciler) -> Reconciler,
    ) -> Self {
        let attesters = MemoryAttesterStore::new();
        let secrets = MemorySecretStore::new();
        let reconciler = Reconciler::new(
            Arc::new(attesters.clone()),
            wrap(secrets.clone()),
            Arc::new(Ed25519SignerBackend),
            Arc::new(RegoSourceCompiler),
            AttesterRegistry::new(),
        );
        Self {
            attesters,
            secrets,
            reconciler: configure(reconciler),
        }
    }

    /// Create an Attester the way `kubectl apply` would
    pub fn apply(&self, name: &str, policy: &str, pgp_secret: &str) -> ResourceKey {
        self.attesters
            .insert(attester(name, policy, pgp_secret))
            .expect("fixture has a namespace")
    }

    /// Replace the policy source, keeping metadata and status
    pub fn edit_policy(&self, key: &ResourceKey, policy: &str) {
        let mut current = self.stored(key);
        current.spec.policy = policy.to_string();
        self.attesters.insert(current).expect("fixture has a namespace");
    }

    pub async fn pass(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ReconcilerError> {
        self.reconciler.reconcile_key(key).await
    }

    /// Run passes until one finishes with `Done` or fails
    pub async fn converge(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ReconcilerError> {
        for _ in 0..MAX_PASSES {
            if self.pass(key).await? == ReconcileOutcome::Done {
                return Ok(ReconcileOutcome::Done);
            }
        }
        panic!("{key} did not converge within {MAX_PASSES} passes");
    }

    pub fn stored(&self, key: &ResourceKey) -> Attester {
        self.attesters
            .get_snapshot(key)
            .unwrap_or_else(|| panic!("{key} missing from store"))
    }

    /// Stored condition statuses in slot order
    pub fn statuses(&self, key: &ResourceKey) -> Vec<(ConditionType, ConditionStatus)> {
        self.stored(key)
            .conditions()
            .iter()
            .map(|c| (c.r#type, c.status))
            .collect()
    }

    pub fn condition(&self, key: &ResourceKey, condition_type: ConditionType) -> ConditionStatus {
        self.stored(key)
            .conditions()
            .iter()
            .find(|c| c.r#type == condition_type)
            .map(|c| c.status)
            .unwrap_or_else(|| panic!("{key} has no {condition_type} condition"))
    }

    /// (spec writes, status writes, secret creates)
    pub fn writes(&self) -> (usize, usize, usize) {
        (
            self.attesters.spec_writes(),
            self.attesters.status_writes(),
            self.secrets.creates(),
        )
    }
}

/// Secret store whose reads miss while `stale_reads` is positive, like a
/// pass that read before a concurrent pass created the secret
pub struct StaleSecretReads {
    pub inner: MemorySecretStore,
    pub stale_reads: Arc<AtomicUsize>,
}

#[async_trait]
impl SecretStore for StaleSecretReads {
    async fn get(&self, key: &ResourceKey) -> Result<SecretRecord, StoreError> {
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Err(StoreError::NotFound(key.clone()));
        }
        self.inner.get(key).await
    }

    async fn create(&self, key: &ResourceKey, material: &KeyMaterial) -> Result<(), StoreError> {
        self.inner.create(key, material).await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
