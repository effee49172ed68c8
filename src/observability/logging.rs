//! # Logging
//!
//! `tracing` subscriber setup. `RUST_LOG` wins when set; otherwise the
//! configured level applies to this crate and `warn` to everything else.

use crate::config::{ControllerConfig, LogFormat};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn default_directives(level: &str) -> String {
    format!("warn,attester_controller={level}")
}

/// Install the global subscriber
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only if a global subscriber is already installed"
)]
pub fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.log_format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?,
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?,
    }
    Ok(())
}
