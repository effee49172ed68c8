//! # Secret Lifecycle
//!
//! Resolves the signing secret behind an Attester, creating it on first use,
//! and removes it when the Attester goes away.

use crate::attester::{Signer, SignerBackend, SignerError};
use crate::constants::SECRET_KEYS_FIELD;
use crate::crd::ResourceKey;
use crate::store::{SecretRecord, SecretStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to look up secret {key}: {source}")]
    Lookup {
        key: ResourceKey,
        #[source]
        source: StoreError,
    },
    #[error("secret {key} holds malformed key material: {source}")]
    Malformed {
        key: ResourceKey,
        #[source]
        source: SignerError,
    },
    #[error("failed to generate key material for {key}: {source}")]
    Generate {
        key: ResourceKey,
        #[source]
        source: SignerError,
    },
    #[error("failed to create secret {key}: {source}")]
    Create {
        key: ResourceKey,
        #[source]
        source: StoreError,
    },
    #[error("failed to delete secret {key}: {source}")]
    Delete {
        key: ResourceKey,
        #[source]
        source: StoreError,
    },
}

/// A signer together with whether its secret was created by this call
#[derive(Debug, Clone)]
pub struct ResolvedSigner {
    pub signer: Arc<dyn Signer>,
    pub created: bool,
}

#[derive(Clone)]
pub struct SecretLifecycleManager {
    store: Arc<dyn SecretStore>,
    backend: Arc<dyn SignerBackend>,
}

impl std::fmt::Debug for SecretLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretLifecycleManager").finish_non_exhaustive()
    }
}

impl SecretLifecycleManager {
    pub fn new(store: Arc<dyn SecretStore>, backend: Arc<dyn SignerBackend>) -> Self {
        Self { store, backend }
    }

    /// Rebuild the signer stored under `secret_ref`, or generate and store a new one.
    ///
    /// Malformed key material is reported as such and never replaced. Losing a
    /// create race to another pass adopts the secret that pass stored.
    pub async fn resolve_or_create(
        &self,
        identity: &ResourceKey,
        secret_ref: &str,
    ) -> Result<ResolvedSigner, SecretError> {
        let key = identity.sibling(secret_ref);
        match self.store.get(&key).await {
            Ok(record) => self.load(key, &record),
            Err(StoreError::NotFound(_)) => {
                info!(secret = %key, "Secret not found, creating a new one");
                let (signer, material) =
                    self.backend
                        .new_signer(identity)
                        .map_err(|source| SecretError::Generate {
                            key: key.clone(),
                            source,
                        })?;
                match self.store.create(&key, &material).await {
                    Ok(()) => {
                        info!(secret = %key, key_id = signer.key_id(), "Created signer secret");
                        Ok(ResolvedSigner {
                            signer,
                            created: true,
                        })
                    }
                    Err(StoreError::Conflict { .. }) => {
                        debug!(secret = %key, "Secret created concurrently, loading it");
                        match self.store.get(&key).await {
                            Ok(record) => self.load(key, &record),
                            Err(source) => Err(SecretError::Lookup { key, source }),
                        }
                    }
                    Err(source) => Err(SecretError::Create { key, source }),
                }
            }
            Err(source) => Err(SecretError::Lookup { key, source }),
        }
    }

    fn load(&self, key: ResourceKey, record: &SecretRecord) -> Result<ResolvedSigner, SecretError> {
        let Some(material) = record.data.get(SECRET_KEYS_FIELD) else {
            return Err(SecretError::Malformed {
                key,
                source: SignerError::Parse(format!("no `{SECRET_KEYS_FIELD}` field")),
            });
        };
        let signer = self
            .backend
            .parse_signer(material)
            .map_err(|source| SecretError::Malformed {
                key: key.clone(),
                source,
            })?;
        debug!(secret = %key, key_id = signer.key_id(), "Loaded signer from secret");
        Ok(ResolvedSigner {
            signer,
            created: false,
        })
    }

    /// Remove the secret; a missing secret counts as removed
    pub async fn delete_secret(
        &self,
        identity: &ResourceKey,
        secret_ref: &str,
    ) -> Result<(), SecretError> {
        let key = identity.sibling(secret_ref);
        self.store
            .delete(&key)
            .await
            .map_err(|source| SecretError::Delete { key, source })
    }
}
