//! Attester Controller Library
//!
//! Reconciliation engine for `Attester` resources. An Attester pairs a policy
//! with a signing key; the controller keeps its status conditions, finalizer
//! and signing secret consistent and publishes ready attesters into an
//! in-memory registry.
//!
//! ## Quick Start
//!
//! ```rust
//! use attester_controller::prelude::*;
//! ```

pub mod attester;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
