// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Palaver pipeline.
//!
//! Pipeline crates record through the metrics-rs facade helpers in
//! [`recording`]; when no recorder is installed those calls are no-ops.
//! The binary installs [`PrometheusExporter`] and the gateway serves its
//! rendered text on `/metrics`.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use palaver_core::PalaverError;

pub use recording::{
    record_assignment, record_inbound, record_notification, record_provider_unavailable,
    record_status_callback, record_tier_call, record_tokens, record_turn_latency,
};

/// Installed Prometheus recorder.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn install() -> Result<Self, PalaverError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            PalaverError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
