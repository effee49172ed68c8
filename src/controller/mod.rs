//! # Controller
//!
//! - `backoff`: Fibonacci backoff for failed passes
//! - `filter`: watch event filter for self-inflicted changes
//! - `reconciler`: the per-resource convergence loop
//! - `server`: HTTP server for metrics, probes and the attester listing

pub mod backoff;
pub mod filter;
pub mod reconciler;
pub mod server;
