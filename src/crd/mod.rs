//! # Custom Resource Definitions
//!
//! CRD types for the Attester Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Attester` custom resource and its spec
//! - `status.rs` - Condition types and the status block
//! - `key.rs` - Namespace-qualified resource identity

mod key;
mod spec;
mod status;

// Re-export all public types
pub use key::ResourceKey;
pub use spec::{Attester, AttesterSpec};
pub use status::{AttesterStatus, Condition, ConditionStatus, ConditionType};
