//! # HTTP Server
//!
//! HTTP server for metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 when controller is ready)
//! - `/attesters` - JSON list of attesters that are ready to sign
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT` environment variable).

use crate::attester::AttesterRegistry;
use crate::observability::metrics::REGISTRY;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    pub registry: AttesterRegistry,
}

impl ServerState {
    #[must_use]
    pub fn new(registry: AttesterRegistry) -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
            registry,
        }
    }
}

/// One entry of the `/attesters` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttesterSummary {
    pub attester: String,
    pub package: String,
    pub rules: Vec<String>,
    pub key_id: String,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/attesters", get(attesters_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve; marks the state ready once the listener is bound
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn attesters_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<AttesterSummary>> {
    let mut summaries: Vec<AttesterSummary> = state
        .registry
        .snapshot()
        .into_values()
        .map(|active| AttesterSummary {
            attester: active.name().to_string(),
            package: active.policy().package().to_string(),
            rules: active.policy().rules().to_vec(),
            key_id: active.key_id().to_string(),
        })
        .collect();
    summaries.sort_by(|a, b| a.attester.cmp(&b.attester));
    Json(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attester::{
        ActiveAttester, Ed25519SignerBackend, PolicyCompiler, RegoSourceCompiler, SignerBackend,
    };
    use crate::crd::ResourceKey;

    fn publish(registry: &AttesterRegistry, name: &str) {
        let key = ResourceKey::new("default", name);
        let policy = RegoSourceCompiler
            .compile(name, "package rode.scan\nallow { true }\n", false)
            .unwrap();
        let (signer, _) = Ed25519SignerBackend.new_signer(&key).unwrap();
        registry.publish(key.clone(), ActiveAttester::new(key.to_string(), policy, signer));
    }

    #[tokio::test]
    async fn test_readyz_follows_flag() {
        let state = Arc::new(ServerState::new(AttesterRegistry::new()));
        let response = readyz_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.is_ready.store(true, Ordering::Relaxed);
        let response = readyz_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_attesters_lists_registry_sorted() {
        let registry = AttesterRegistry::new();
        publish(&registry, "zeta");
        publish(&registry, "alpha");
        let state = Arc::new(ServerState::new(registry));

        let Json(summaries) = attesters_handler(State(state)).await;
        let names: Vec<_> = summaries.iter().map(|s| s.attester.as_str()).collect();
        assert_eq!(names, ["default/alpha", "default/zeta"]);
        assert_eq!(summaries[0].package, "rode.scan");
        assert_eq!(summaries[0].rules, ["allow".to_string()]);
        assert_eq!(summaries[0].key_id.len(), 16);
    }
}
