//! # Attesters
//!
//! A ready attester pairs a compiled [`Policy`] with a [`Signer`]. The
//! reconciler publishes them into the [`AttesterRegistry`]; anything that
//! produces attestations reads them back from there.

pub mod policy;
pub mod registry;
pub mod signer;

pub use policy::{CompileError, Policy, PolicyCompiler, RegoSourceCompiler};
pub use registry::AttesterRegistry;
pub use signer::{Ed25519SignerBackend, KeyMaterial, Signer, SignerBackend, SignerError};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A policy and signer pair ready to produce attestations
#[derive(Debug)]
pub struct ActiveAttester {
    name: String,
    policy: Policy,
    signer: Arc<dyn Signer>,
}

/// Signed statement produced by an attester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub attester: String,
    pub key_id: String,
    /// Base64 signature over the payload
    pub signature: String,
}

impl ActiveAttester {
    pub fn new(name: impl Into<String>, policy: Policy, signer: Arc<dyn Signer>) -> Self {
        Self {
            name: name.into(),
            policy,
            signer,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        self.signer.key_id()
    }

    /// Sign `payload` with this attester's key
    pub fn attest(&self, payload: &[u8]) -> Result<Attestation, SignerError> {
        let signature = self.signer.sign(payload)?;
        Ok(Attestation {
            attester: self.name.clone(),
            key_id: self.signer.key_id().to_string(),
            signature: STANDARD.encode(signature),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ResourceKey;

    #[test]
    fn test_attest_signs_with_attester_key() {
        let key = ResourceKey::new("default", "scan");
        let policy = RegoSourceCompiler
            .compile("scan", "package p\nallow { true }\n", false)
            .unwrap();
        let (signer, _) = Ed25519SignerBackend.new_signer(&key).unwrap();
        let attester = ActiveAttester::new(key.to_string(), policy, Arc::clone(&signer));

        let attestation = attester.attest(b"sha256:abc").unwrap();
        assert_eq!(attestation.attester, "default/scan");
        assert_eq!(attestation.key_id, signer.key_id());

        let signature = STANDARD.decode(attestation.signature).unwrap();
        assert!(signer.verify(b"sha256:abc", &signature));
    }
}
