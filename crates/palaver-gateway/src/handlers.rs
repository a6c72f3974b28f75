// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health, metrics and admin handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use palaver_core::{AgentId, HealthStatus, PluginAdapter, TenantId};
use palaver_pipeline::AvailabilityChange;
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    fn response(status: StatusCode, error: impl Into<String>) -> Response {
        (status, Json(ErrorResponse { error: error.into() })).into_response()
    }
}

/// GET /health
///
/// Unauthenticated. Reports `503 degraded` when the database does not answer.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let healthy = matches!(
        state.pipeline.storage().health_check().await,
        Ok(HealthStatus::Healthy)
    );
    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
///
/// Prometheus text format; 404 when metrics are disabled.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /admin/tenants/{id}/invalidate
pub async fn invalidate_tenant(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    state.pipeline.tenants().invalidate(&TenantId::new(id.as_str()));
    tracing::info!(tenant_id = %id, "tenant cache entry invalidated");
    Json(serde_json::json!({ "tenant_id": id, "invalidated": true })).into_response()
}

/// POST /admin/tenant-cache/clear
pub async fn clear_tenant_cache(State(state): State<GatewayState>) -> Response {
    let cleared = state.pipeline.tenants().len();
    state.pipeline.tenants().clear();
    tracing::info!(cleared, "tenant cache cleared");
    Json(serde_json::json!({ "cleared": cleared })).into_response()
}

/// Request body for POST /admin/agents/{id}/availability.
#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub tenant_id: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ReassignedConversation {
    pub conversation_id: String,
    pub agent_id: String,
}

/// Response body for POST /admin/agents/{id}/availability.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub agent_id: String,
    pub available: bool,
    pub released: Vec<String>,
    pub reassigned: Vec<ReassignedConversation>,
    /// Conversations no other agent had capacity for.
    pub unassigned: Vec<String>,
}

/// POST /admin/agents/{id}/availability
pub async fn set_agent_availability(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<AvailabilityRequest>,
) -> Response {
    let tenant_id = TenantId::new(body.tenant_id.as_str());
    let agent_id = AgentId::new(id.as_str());
    let change = match state
        .pipeline
        .assignment()
        .set_agent_availability(&tenant_id, &agent_id, body.available)
        .await
    {
        Ok(change) => change,
        Err(e) => {
            tracing::error!(tenant_id = %tenant_id, agent_id = %agent_id, error = %e, "availability update failed");
            return ErrorResponse::response(StatusCode::INTERNAL_SERVER_ERROR, "availability update failed");
        }
    };

    let mut response = AvailabilityResponse {
        agent_id: id,
        available: body.available,
        released: Vec::new(),
        reassigned: Vec::new(),
        unassigned: Vec::new(),
    };
    match change {
        AvailabilityChange::UnknownAgent => {
            return ErrorResponse::response(
                StatusCode::NOT_FOUND,
                format!("no agent {agent_id} for tenant {tenant_id}"),
            );
        }
        AvailabilityChange::Updated => {}
        AvailabilityChange::Reassigned(report) => {
            response.released = report.released.iter().map(|c| c.to_string()).collect();
            response.reassigned = report
                .reassigned
                .iter()
                .map(|(conversation, agent)| ReassignedConversation {
                    conversation_id: conversation.to_string(),
                    agent_id: agent.to_string(),
                })
                .collect();
            response.unassigned = report.unassigned.iter().map(|c| c.to_string()).collect();
        }
    }
    tracing::info!(
        tenant_id = %tenant_id,
        agent_id = %agent_id,
        available = body.available,
        reassigned = response.reassigned.len(),
        "agent availability updated"
    );
    Json(response).into_response()
}
