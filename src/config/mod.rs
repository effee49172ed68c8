//! # Configuration
//!
//! Process-level settings for the controller binary.

mod controller;

pub use controller::{ControllerConfig, LogFormat};
