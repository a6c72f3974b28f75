// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use palaver_config::model::PalaverConfig;
use palaver_core::PalaverError;
use palaver_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::webhooks;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// How inbound webhooks are authenticated.
#[derive(Clone)]
pub struct WebhookAuth {
    /// Twilio auth token used as the HMAC key.
    pub auth_token: Option<String>,
    pub verify_signatures: bool,
    /// Externally visible base URL; signatures are computed over it.
    pub public_url: Option<String>,
}

impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .field("verify_signatures", &self.verify_signatures)
            .field("public_url", &self.public_url)
            .finish()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<Pipeline>,
    pub webhook: WebhookAuth,
    /// Admin API authentication.
    pub auth: AuthConfig,
    pub health: HealthState,
    /// Pipeline turns started by acknowledged webhooks.
    pub turns: TaskTracker,
}

impl GatewayState {
    pub fn from_config(
        config: &PalaverConfig,
        pipeline: Arc<Pipeline>,
        prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    ) -> Self {
        Self {
            pipeline,
            webhook: WebhookAuth {
                auth_token: config.whatsapp.auth_token.clone(),
                verify_signatures: config.whatsapp.verify_signatures,
                public_url: config.server.public_url.clone(),
            },
            auth: AuthConfig {
                bearer_token: config.admin.bearer_token.clone(),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render,
            },
            turns: TaskTracker::new(),
        }
    }
}

/// Stop accepting new turns and wait up to `timeout` for running ones.
///
/// Returns `false` if turns were still running when the timeout expired.
pub async fn drain_turns(turns: &TaskTracker, timeout: Duration) -> bool {
    turns.close();
    if turns.is_empty() {
        tracing::info!("no in-flight turns to drain");
        return true;
    }
    let in_flight = turns.len();
    tracing::info!(in_flight, timeout_secs = timeout.as_secs(), "draining in-flight turns");
    match tokio::time::timeout(timeout, turns.wait()).await {
        Ok(()) => {
            tracing::info!(in_flight, "all in-flight turns drained");
            true
        }
        Err(_) => {
            tracing::warn!(remaining = turns.len(), "drain timeout reached, abandoning in-flight turns");
            false
        }
    }
}

/// Assemble every gateway route:
/// - POST /webhooks/whatsapp, POST /webhooks/whatsapp/status (signature-gated)
/// - GET /health, GET /metrics
/// - POST /admin/... (bearer auth)
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/webhooks/whatsapp", post(webhooks::post_inbound))
        .route("/webhooks/whatsapp/status", post(webhooks::post_status))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/admin/tenants/{id}/invalidate",
            post(handlers::invalidate_tenant),
        )
        .route("/admin/tenant-cache/clear", post(handlers::clear_tenant_cache))
        .route(
            "/admin/agents/{id}/availability",
            post(handlers::set_agent_availability),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port` and serve until `shutdown` is cancelled.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), PalaverError> {
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PalaverError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PalaverError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway stopped");
    Ok(())
}
