// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI provider for deterministic testing.
//!
//! Responses are queued per model name. When a model's queue is empty the
//! model's default response is used, then the global default
//! (`"mock response"`). Marking the provider unavailable fails every call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use palaver_core::{
    AdapterType, HealthStatus, PalaverError, PluginAdapter, ProviderAdapter, ProviderRequest,
    ProviderResponse, TokenUsage,
};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MockProvider {
    /// `None` entries fail that call.
    queues: Mutex<HashMap<String, VecDeque<Option<String>>>>,
    defaults: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<ProviderRequest>>,
    unavailable: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for `model`.
    pub async fn add_response(&self, model: &str, text: impl Into<String>) {
        self.queues
            .lock()
            .await
            .entry(model.to_string())
            .or_default()
            .push_back(Some(text.into()));
    }

    /// Make the next call to `model` fail.
    pub async fn fail_next(&self, model: &str) {
        self.queues
            .lock()
            .await
            .entry(model.to_string())
            .or_default()
            .push_back(None);
    }

    /// Response for `model` whenever its queue is empty.
    pub async fn set_default(&self, model: &str, text: impl Into<String>) {
        self.defaults
            .lock()
            .await
            .insert(model.to_string(), text.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn models_called(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, PalaverError> {
        self.requests.lock().await.push(request.clone());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PalaverError::provider("mock provider unavailable"));
        }

        let queued = self
            .queues
            .lock()
            .await
            .get_mut(&request.model)
            .and_then(|q| q.pop_front());
        let text = match queued {
            Some(Some(text)) => text,
            Some(None) => return Err(PalaverError::provider("scripted mock failure")),
            None => self
                .defaults
                .lock()
                .await
                .get(&request.model)
                .cloned()
                .unwrap_or_else(|| "mock response".to_string()),
        };

        Ok(ProviderResponse {
            content: text,
            model: request.model,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
            },
            stop_reason: Some("end_turn".to_string()),
        })
    }
}
