//! # Attester Spec
//!
//! The `Attester` custom resource: a policy source plus a reference to the
//! secret holding its signing key.

use crate::constants::ATTESTER_FINALIZER;
use crate::crd::{AttesterStatus, Condition};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// Attester Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: rode.liatr.io/v1alpha1
/// kind: Attester
/// metadata:
///   name: image-scan
///   namespace: default
/// spec:
///   pgpSecret: image-scan-keys
///   policy: |
///     package image_scan
///
///     default allow = false
///
///     allow {
///       count(input.violations) == 0
///     }
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Attester",
    group = "rode.liatr.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::AttesterStatus",
    shortname = "att",
    printcolumn = r#"{"name":"Compiled", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Compiled\")].status"}, {"name":"SecretReady", "type":"string", "jsonPath":".status.conditions[?(@.type==\"SecretReady\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AttesterSpec {
    /// Policy source text, compiled on every reconciliation
    pub policy: String,
    /// Name of the secret holding the signing key material.
    /// Empty means unassigned; the controller defaults it to the Attester's own name.
    #[serde(default)]
    pub pgp_secret: String,
}

impl Attester {
    /// Whether the API server has marked this resource for deletion
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the deletion-guard finalizer is registered
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == ATTESTER_FINALIZER)
    }

    /// Conditions in their persisted two-slot order (empty until initialized)
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.conditions.as_slice())
    }

    /// Mutable access to the status block, creating an empty one if absent
    pub fn status_mut(&mut self) -> &mut AttesterStatus {
        self.status.get_or_insert_with(AttesterStatus::default)
    }
}
