//! # Reconciler
//!
//! Convergence loop for Attester resources.
//!
//! - `conditions`: two-slot condition bookkeeping
//! - `finalizer`: deletion-guard marker
//! - `secret`: signing secret resolution and cleanup
//! - `reconcile`: the per-resource state machine

pub mod conditions;
pub mod finalizer;
pub mod reconcile;
pub mod secret;
mod types;

pub use conditions::{ConditionError, ConditionSet};
pub use reconcile::reconcile;
pub use secret::{ResolvedSigner, SecretError, SecretLifecycleManager};
pub use types::{BackoffState, ReconcileOutcome, Reconciler, ReconcilerError, RequeueReason};
