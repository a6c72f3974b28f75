// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging transport that captures outbound messages.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use palaver_core::{
    AdapterType, ChannelAdapter, HealthStatus, OutboundMessage, PalaverError, PluginAdapter,
};
use tokio::sync::Mutex;

/// Captures every successful send and returns `SMOUT<n>` provider ids.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    counter: AtomicUsize,
    failing: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Bodies of messages sent to `to`, in order.
    pub async fn bodies_to(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to == to)
            .map(|m| m.body.clone())
            .collect()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockTransport {
    async fn send(&self, msg: OutboundMessage) -> Result<String, PalaverError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PalaverError::transport("mock transport failing"));
        }
        self.sent.lock().await.push(msg);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("SMOUT{n}"))
    }
}
