//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use attester_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::attester::{
    ActiveAttester, Attestation, AttesterRegistry, Ed25519SignerBackend, Policy, PolicyCompiler,
    RegoSourceCompiler, Signer, SignerBackend,
};

pub use crate::controller::reconciler::{
    reconcile, BackoffState, ReconcileOutcome, Reconciler, ReconcilerError, RequeueReason,
};

pub use crate::store::{AttesterStore, SecretStore, StoreError};

pub use crate::config::ControllerConfig;
