// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles a complete [`Pipeline`] over a temp SQLite
//! database with a [`MockProvider`] and a [`MockTransport`], and provides
//! helpers to seed tenants and agents and to push webhook events through.

use std::sync::Arc;

use palaver_config::model::{PalaverConfig, StorageConfig};
use palaver_core::{
    Agent, AgentId, AgentRole, AssignmentStrategy, Faq, InboundEvent, PalaverError,
    StorageAdapter, Tenant, TenantId, now_timestamp,
};
use palaver_cost::CostLedger;
use palaver_pipeline::{Pipeline, PipelineOutcome};
use palaver_storage::{SqliteStorage, queries};

use crate::mock_provider::MockProvider;
use crate::mock_transport::MockTransport;

pub const FAST_MODEL: &str = "test-fast";
pub const STANDARD_MODEL: &str = "test-standard";
pub const PREMIUM_MODEL: &str = "test-premium";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: PalaverConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = PalaverConfig::default();
        config.routing.fast_model = FAST_MODEL.into();
        config.routing.standard_model = STANDARD_MODEL.into();
        config.routing.premium_model = PREMIUM_MODEL.into();
        config.routing.ai_timeout_ms = 2_000;
        Self { config }
    }

    /// Adjust the configuration before the pipeline is built.
    pub fn configure(mut self, f: impl FnOnce(&mut PalaverConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, PalaverError> {
        let temp_dir = tempfile::TempDir::new().map_err(PalaverError::storage)?;
        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: temp_dir
                .path()
                .join("test.db")
                .to_string_lossy()
                .into_owned(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;
        let ledger = CostLedger::new(storage.database()?.connection().clone());

        let provider = Arc::new(MockProvider::new());
        let transport = Arc::new(MockTransport::new());
        let pipeline = Pipeline::new(
            &config,
            storage.clone(),
            transport.clone(),
            provider.clone(),
            Some(ledger.clone()),
        )?;

        Ok(TestHarness {
            pipeline: Arc::new(pipeline),
            provider,
            transport,
            storage,
            ledger,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline wired to mocks, for integration tests.
pub struct TestHarness {
    pub pipeline: Arc<Pipeline>,
    pub provider: Arc<MockProvider>,
    pub transport: Arc<MockTransport>,
    pub storage: Arc<SqliteStorage>,
    pub ledger: CostLedger,
    pub config: PalaverConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, PalaverError> {
        Self::builder().build().await
    }

    pub fn store(&self) -> Arc<dyn StorageAdapter> {
        self.storage.clone()
    }

    pub async fn seed_tenant(&self, tenant: &Tenant) -> Result<(), PalaverError> {
        queries::tenants::upsert_tenant(self.storage.database()?, tenant).await
    }

    pub async fn seed_agent(&self, agent: &Agent) -> Result<(), PalaverError> {
        queries::agents::upsert_agent(self.storage.database()?, agent).await
    }

    /// Push one inbound message through the pipeline.
    pub async fn send(&self, sid: &str, from: &str, to: &str, body: &str) -> PipelineOutcome {
        self.pipeline.handle_inbound(inbound(sid, from, to, body)).await
    }
}

/// An inbound event with normalized numbers.
pub fn inbound(sid: &str, from: &str, to: &str, body: &str) -> InboundEvent {
    InboundEvent {
        provider_message_id: sid.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        body: body.to_string(),
        profile_name: None,
        media: Vec::new(),
        received_at: now_timestamp(),
    }
}

/// An active salon tenant with two services and one FAQ.
pub fn tenant(id: &str, number: &str) -> Tenant {
    Tenant {
        id: TenantId::new(id),
        name: format!("Salon {id}"),
        whatsapp_number: Some(number.to_string()),
        business_info: Some("Open 9-18, Monday to Saturday.".into()),
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

pub fn agent(id: &str, tenant_id: &str, max_conversations: u32) -> Agent {
    Agent {
        id: AgentId::new(id),
        tenant_id: TenantId::new(tenant_id),
        name: format!("Agent {id}"),
        role: AgentRole::Agent,
        is_available: true,
        max_conversations,
        last_assigned_at: None,
    }
}

/// A classification reply as the router expects it from a model.
pub fn classification(intent: &str, confidence: f64) -> String {
    serde_json::json!({ "intent": intent, "confidence": confidence }).to_string()
}
