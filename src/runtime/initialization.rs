//! # Initialization
//!
//! Controller start-up: rustls provider, tracing, metrics, HTTP server,
//! Kubernetes client and the reconciler with its collaborators.

use crate::attester::{AttesterRegistry, Ed25519SignerBackend, RegoSourceCompiler};
use crate::config::ControllerConfig;
use crate::constants::{SERVER_POLL_INTERVAL_MS, SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::store::{KubeAttesterStore, KubeSecretStore};
use anyhow::Result;
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = ControllerConfig::from_env();
    observability::logging::init_tracing(&config)?;

    info!("Starting Attester Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    debug!(?config, "Loaded configuration");

    observability::metrics::register_metrics()?;

    let registry = AttesterRegistry::new();
    let server_state = Arc::new(ServerState::new(registry.clone()));

    let server_state_clone = server_state.clone();
    let port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default().await?;

    let reconciler = Reconciler::new(
        Arc::new(KubeAttesterStore::new(client.clone())),
        Arc::new(KubeSecretStore::new(client.clone())),
        Arc::new(Ed25519SignerBackend),
        Arc::new(RegoSourceCompiler),
        registry,
    )
    .with_policy_trace(config.policy_trace)
    .with_requeue_after_write(config.requeue_after_write_duration());

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler: Arc::new(reconciler),
        server_state,
        config,
    })
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
