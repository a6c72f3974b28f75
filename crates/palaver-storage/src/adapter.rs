// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use palaver_config::model::StorageConfig;
use palaver_core::{
    Actor, AdapterType, Agent, AgentId, AgentLoad, AssignmentClaim, Booking, BookingOutcome,
    Conversation, ConversationId, ConversationUpdate, DeliveryStatus, HealthStatus, InsertOutcome,
    Message, MessageId, NewBooking, NewLead, NewMessage, NewNotification, Notification,
    PalaverError, PluginAdapter, StatusUpdate, StorageAdapter, Tenant, TenantId,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// The underlying database, for provisioning and reporting queries that
    /// sit outside the pipeline's adapter surface.
    pub fn database(&self) -> Result<&Database, PalaverError> {
        self.db.get().ok_or_else(|| PalaverError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), PalaverError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), PalaverError> {
        let db =
            Database::open_with_options(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| PalaverError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), PalaverError> {
        Self::checkpoint(self.database()?).await
    }

    async fn find_tenant_by_number(&self, number: &str) -> Result<Option<Tenant>, PalaverError> {
        queries::tenants::find_by_number(self.database()?, number).await
    }

    async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, PalaverError> {
        queries::tenants::get_tenant(self.database()?, tenant_id).await
    }

    async fn upsert_conversation(
        &self,
        tenant_id: &TenantId,
        customer_phone: &str,
        customer_name: Option<&str>,
        actor: Actor,
    ) -> Result<Conversation, PalaverError> {
        queries::conversations::upsert_conversation(
            self.database()?,
            tenant_id,
            customer_phone,
            customer_name,
            actor,
        )
        .await
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, PalaverError> {
        queries::conversations::get_conversation(self.database()?, id).await
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
        actor: Actor,
    ) -> Result<(), PalaverError> {
        queries::conversations::update_conversation(self.database()?, id, update, actor).await
    }

    async fn insert_message(&self, msg: NewMessage) -> Result<InsertOutcome, PalaverError> {
        queries::messages::insert_message(self.database()?, msg).await
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, PalaverError> {
        queries::messages::recent_messages(self.database()?, conversation_id, limit).await
    }

    async fn mark_outbound_result(
        &self,
        id: &MessageId,
        provider_message_id: Option<&str>,
        status: DeliveryStatus,
    ) -> Result<(), PalaverError> {
        queries::messages::mark_outbound_result(self.database()?, id, provider_message_id, status)
            .await
    }

    async fn update_delivery_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<StatusUpdate, PalaverError> {
        queries::messages::update_delivery_status(self.database()?, provider_message_id, status)
            .await
    }

    async fn list_agents(&self, tenant_id: &TenantId) -> Result<Vec<AgentLoad>, PalaverError> {
        queries::agents::list_agents(self.database()?, tenant_id).await
    }

    async fn claim_agent(&self, claim: AssignmentClaim) -> Result<Option<Agent>, PalaverError> {
        queries::agents::claim_agent(self.database()?, claim).await
    }

    async fn release_agent_conversations(
        &self,
        tenant_id: &TenantId,
        agent_id: &AgentId,
        actor: Actor,
    ) -> Result<Vec<ConversationId>, PalaverError> {
        queries::agents::release_agent_conversations(self.database()?, tenant_id, agent_id, actor)
            .await
    }

    async fn set_agent_availability(
        &self,
        tenant_id: &TenantId,
        agent_id: &AgentId,
        available: bool,
    ) -> Result<bool, PalaverError> {
        queries::agents::set_availability(self.database()?, tenant_id, agent_id, available).await
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, PalaverError> {
        queries::notifications::insert_notification(self.database()?, notification).await
    }

    async fn list_notifications(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Notification>, PalaverError> {
        queries::notifications::list_notifications(self.database()?, tenant_id).await
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<BookingOutcome, PalaverError> {
        queries::bookings::create_booking(self.database()?, booking).await
    }

    async fn reschedule_booking(
        &self,
        booking_id: &str,
        date: &str,
        time: &str,
    ) -> Result<BookingOutcome, PalaverError> {
        queries::bookings::reschedule_booking(self.database()?, booking_id, date, time).await
    }

    async fn cancel_booking(&self, booking_id: &str) -> Result<bool, PalaverError> {
        queries::bookings::cancel_booking(self.database()?, booking_id).await
    }

    async fn upcoming_booking(
        &self,
        tenant_id: &TenantId,
        customer_phone: &str,
        today: &str,
    ) -> Result<Option<Booking>, PalaverError> {
        queries::bookings::upcoming_booking(self.database()?, tenant_id, customer_phone, today).await
    }

    async fn due_reminders(&self, from: &str, until: &str) -> Result<Vec<Booking>, PalaverError> {
        queries::bookings::due_reminders(self.database()?, from, until).await
    }

    async fn mark_reminder_sent(&self, booking_id: &str) -> Result<(), PalaverError> {
        queries::bookings::mark_reminder_sent(self.database()?, booking_id).await
    }

    async fn lapsed_bookings(&self, before: &str) -> Result<Vec<Booking>, PalaverError> {
        queries::bookings::lapsed_bookings(self.database()?, before).await
    }

    async fn mark_no_show(&self, booking_id: &str) -> Result<bool, PalaverError> {
        queries::bookings::mark_no_show(self.database()?, booking_id).await
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<(), PalaverError> {
        queries::bookings::insert_lead(self.database()?, lead).await
    }
}
