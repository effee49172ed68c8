//! # Stores
//!
//! Persistence seams used by the reconciler.
//!
//! - `AttesterStore` loads and persists Attester resources (spec/metadata and
//!   status are separate writes, as with the Kubernetes status sub-resource)
//! - `SecretStore` holds signing key material
//!
//! `kube` implementations talk to the API server; `memory` implementations
//! back tests and local runs.

use crate::attester::KeyMaterial;
use crate::crd::{Attester, ResourceKey};
use async_trait::async_trait;
use ::kube::ResourceExt;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod kube;
pub mod memory;

pub use self::kube::{KubeAttesterStore, KubeSecretStore};
pub use self::memory::{MemoryAttesterStore, MemorySecretStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ResourceKey),
    #[error("conflict writing {key}: {message}")]
    Conflict { key: ResourceKey, message: String },
    #[error("store request for {key} failed: {message}")]
    Backend { key: ResourceKey, message: String },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub(crate) fn key_of(attester: &Attester) -> Result<ResourceKey, StoreError> {
    ResourceKey::for_object(attester).ok_or_else(|| StoreError::Backend {
        key: ResourceKey::new("", attester.name_any()),
        message: "attester has no namespace".to_string(),
    })
}

/// Resource store for Attesters
#[async_trait]
pub trait AttesterStore: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> Result<Attester, StoreError>;

    /// Persist metadata and spec; status in the argument is ignored
    async fn update(&self, attester: &Attester) -> Result<Attester, StoreError>;

    /// Persist the status block; metadata and spec in the argument are ignored
    async fn update_status(&self, attester: &Attester) -> Result<Attester, StoreError>;
}

/// Stored secret contents
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretRecord {
    pub data: BTreeMap<String, Vec<u8>>,
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Secret store for signing key material
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> Result<SecretRecord, StoreError>;

    /// Create the secret; an existing secret is a `Conflict`
    async fn create(&self, key: &ResourceKey, material: &KeyMaterial) -> Result<(), StoreError>;

    /// Delete the secret; a missing secret is not an error
    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AttesterSpec;

    fn attester(namespace: Option<&str>) -> Attester {
        let mut attester = Attester::new(
            "scan",
            AttesterSpec {
                policy: "package p".to_string(),
                pgp_secret: String::new(),
            },
        );
        attester.metadata.namespace = namespace.map(str::to_string);
        attester
    }

    #[test]
    fn test_key_of_uses_namespace_and_name() {
        assert_eq!(
            key_of(&attester(Some("ci"))).unwrap(),
            ResourceKey::new("ci", "scan")
        );
    }

    #[test]
    fn test_key_of_without_namespace_names_the_object() {
        let err = key_of(&attester(None)).unwrap_err();
        assert_eq!(
            err,
            StoreError::Backend {
                key: ResourceKey::new("", "scan"),
                message: "attester has no namespace".to_string(),
            }
        );
        assert!(!err.is_not_found());
    }
}
