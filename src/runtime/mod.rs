//! # Runtime
//!
//! Process wiring for the controller binary.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `error_policy`: requeue with per-resource backoff after a failed pass
//! - `watch_loop`: filtered watch stream driving the `kube_runtime` controller

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
