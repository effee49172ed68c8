//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT,
    DEFAULT_REQUEUE_AFTER_WRITE_SECS,
};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Port for `/metrics`, `/healthz`, `/readyz` and `/attesters`
    pub metrics_port: u16,
    /// Default log directive when `RUST_LOG` is unset (e.g. "info", "debug")
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Requeue delay after a pass that stopped early following its own write (seconds)
    pub requeue_after_write_secs: u64,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Forwarded to the policy compiler as its trace flag
    pub policy_trace: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            requeue_after_write_secs: DEFAULT_REQUEUE_AFTER_WRITE_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            policy_trace: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            metrics_port: parsed_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map_or(defaults.log_format, |v| LogFormat::parse(&v)),
            requeue_after_write_secs: parsed_or(
                &lookup,
                "REQUEUE_AFTER_WRITE_SECS",
                defaults.requeue_after_write_secs,
            ),
            max_concurrent_reconciliations: parsed_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            policy_trace: lookup("POLICY_TRACE").map_or(defaults.policy_trace, |v| truthy(&v)),
        }
    }

    /// Get requeue-after-write duration
    pub fn requeue_after_write_duration(&self) -> Duration {
        Duration::from_secs(self.requeue_after_write_secs)
    }
}

/// Parse a variable or fall back to the default on absence or parse failure
fn parsed_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn truthy(value: &str) -> bool {
    let v_lower = value.to_lowercase();
    v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
}
