//! # Watch Loop
//!
//! Watches Attester resources in all namespaces and drives reconciliation.
//!
//! The raw watch stream feeds the reflector store first, so the controller's
//! cache always sees every event. Only then does [`ChangeFilter`] drop the
//! events this controller caused itself before they reach the scheduler.

use crate::config::ControllerConfig;
use crate::controller::filter::ChangeFilter;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Attester;
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::{future, StreamExt, TryStreamExt};
use kube::{Api, Client};
use kube_runtime::{controller, reflector, watcher, Controller, WatchStreamExt};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    let attesters: Api<Attester> = Api::all(client);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(stop_on(
        shutdown_signal(),
        server_state.clone(),
        shutdown_tx,
    ));

    let (reader, writer) = reflector::store();
    let mut filter = ChangeFilter::<Attester>::new();
    let triggers = watcher(attesters, watcher::Config::default().any_semantic())
        .default_backoff()
        .reflect(writer)
        .try_filter_map(move |event| future::ready(Ok(filter.process(event))));

    let controller_config =
        controller::Config::default().concurrency(config.max_concurrent_reconciliations);

    info!(
        concurrency = config.max_concurrent_reconciliations,
        "Starting controller watch loop..."
    );
    Controller::for_stream(triggers, reader)
        .with_config(controller_config)
        .graceful_shutdown_on(async move {
            if shutdown_rx.await.is_err() {
                warn!("Shutdown listener stopped without a signal");
            }
        })
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| {
            match result {
                Ok((obj, _action)) => debug!(attester = %obj, "Reconciled"),
                Err(controller::Error::ReconcilerFailed(e, obj)) => {
                    debug!(attester = %obj, error = %e, "Reconcile failed, requeued");
                }
                Err(e) => warn!(error = %e, "Controller stream error"),
            }
            future::ready(())
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM. A listener that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for Ctrl-C");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for SIGTERM");
                future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Once `signal` resolves, mark the server not ready and tell the controller to stop
async fn stop_on(
    signal: impl Future<Output = ()>,
    server_state: Arc<ServerState>,
    shutdown: oneshot::Sender<()>,
) {
    signal.await;
    info!("Received shutdown signal, initiating graceful shutdown...");
    server_state.is_ready.store(false, Ordering::Relaxed);
    if shutdown.send(()).is_err() {
        debug!("Controller already stopped");
    }
}
