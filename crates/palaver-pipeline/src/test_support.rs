// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures for pipeline unit tests: a temp SQLite store, a per-model
//! scripted provider and a recording channel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use palaver_config::model::StorageConfig;
use palaver_core::{
    AdapterType, Agent, AgentId, AgentRole, AssignmentStrategy, ChannelAdapter, Faq, HealthStatus,
    OutboundMessage, PalaverError, PluginAdapter, ProviderAdapter, ProviderRequest,
    ProviderResponse, StorageAdapter, Tenant, TenantId, TokenUsage,
};
use palaver_storage::SqliteStorage;
use palaver_storage::queries;

pub const FAST: &str = "fast-model";
pub const STANDARD: &str = "standard-model";
pub const PREMIUM: &str = "premium-model";

pub struct TestStore {
    storage: Arc<SqliteStorage>,
    _dir: tempfile::TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("pipeline.db").to_string_lossy().into_owned(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        Self {
            storage: Arc::new(storage),
            _dir: dir,
        }
    }

    pub fn storage(&self) -> Arc<dyn StorageAdapter> {
        self.storage.clone()
    }

    pub fn sqlite(&self) -> &SqliteStorage {
        &self.storage
    }

    pub async fn seed_tenant(&self, tenant: &Tenant) {
        queries::tenants::upsert_tenant(self.storage.database().unwrap(), tenant)
            .await
            .unwrap();
    }

    pub async fn seed_agent(&self, agent: &Agent) {
        queries::agents::upsert_agent(self.storage.database().unwrap(), agent)
            .await
            .unwrap();
    }
}

pub fn tenant(id: &str, number: &str) -> Tenant {
    Tenant {
        id: TenantId::new(id),
        name: format!("Salon {id}"),
        whatsapp_number: Some(number.to_string()),
        business_info: Some("Open 9-18, Monday to Saturday. 12 rue de la Paix.".into()),
        services: vec!["Haircut".into(), "Coloring".into()],
        faqs: vec![Faq {
            question: "What are your opening hours?".into(),
            answer: "We are open 9-18, Monday to Saturday.".into(),
        }],
        assignment_strategy: AssignmentStrategy::RoundRobin,
        auto_assign: true,
        is_active: true,
    }
}

pub fn agent(id: &str, tenant_id: &str, max: u32) -> Agent {
    Agent {
        id: AgentId::new(id),
        tenant_id: TenantId::new(tenant_id),
        name: format!("Agent {id}"),
        role: AgentRole::Agent,
        is_available: true,
        max_conversations: max,
        last_assigned_at: None,
    }
}

pub fn classification(intent: &str, confidence: f64) -> String {
    serde_json::json!({ "intent": intent, "confidence": confidence }).to_string()
}

/// Replies are queued per model; an empty queue fails the call.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<HashMap<String, VecDeque<Option<String>>>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn reply(&self, model: &str, text: impl Into<String>) -> &Self {
        self.queue(model, Some(text.into()))
    }

    pub fn fail(&self, model: &str) -> &Self {
        self.queue(model, None)
    }

    fn queue(&self, model: &str, reply: Option<String>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn models_called(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
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
impl ProviderAdapter for ScriptedProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, PalaverError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.model)
            .and_then(|q| q.pop_front())
            .flatten();
        match reply {
            Some(content) => Ok(ProviderResponse {
                content,
                model: request.model,
                usage: TokenUsage {
                    input_tokens: 200,
                    output_tokens: 20,
                },
                stop_reason: Some("end_turn".into()),
            }),
            None => Err(PalaverError::provider("scripted failure")),
        }
    }
}

/// Records every outbound message; fails sends while `failing` is set.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub failing: std::sync::atomic::AtomicBool,
}

impl RecordingChannel {
    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.body.clone()).collect()
    }
}

#[async_trait]
impl PluginAdapter for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
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
impl ChannelAdapter for RecordingChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<String, PalaverError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PalaverError::transport("recording channel is failing"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(msg);
        Ok(format!("SMOUT{}", sent.len()))
    }
}
