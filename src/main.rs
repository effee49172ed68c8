//! # Attester Controller
//!
//! Kubernetes controller that turns `Attester` resources into ready-to-use
//! signing attesters: it compiles each policy, provisions a signing key in a
//! Secret, tracks progress in status conditions, and cleans up on deletion.

use anyhow::Result;
use attester_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.client, init.reconciler, init.server_state, &init.config).await
}
