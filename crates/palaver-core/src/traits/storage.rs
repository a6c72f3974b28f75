// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::PalaverError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Actor, Agent, AgentId, AgentLoad, AssignmentClaim, Booking, BookingOutcome, Conversation,
    ConversationId, ConversationUpdate, DeliveryStatus, InsertOutcome, Message, MessageId,
    NewBooking, NewLead, NewMessage, NewNotification, Notification, StatusUpdate, Tenant, TenantId,
};

/// Adapter for storage and persistence backends.
///
/// Every conversation mutation takes an [`Actor`] and is recorded in the
/// conversation audit trail. Uniqueness rules (one open conversation per
/// customer, one message per provider id, one confirmed booking per slot)
/// are enforced by the backend, not by callers.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, pragmas).
    async fn initialize(&self) -> Result<(), PalaverError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), PalaverError>;

    // --- Tenants ---

    /// Looks up the active tenant owning a canonical destination number.
    async fn find_tenant_by_number(&self, number: &str) -> Result<Option<Tenant>, PalaverError>;

    /// Loads a tenant by id, active or not.
    async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, PalaverError>;

    // --- Conversations ---

    /// Returns the customer's open conversation, reactivating the latest
    /// resolved one or creating a new one when none is open.
    async fn upsert_conversation(
        &self,
        tenant_id: &TenantId,
        customer_phone: &str,
        customer_name: Option<&str>,
        actor: Actor,
    ) -> Result<Conversation, PalaverError>;

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, PalaverError>;

    /// Applies a partial update and appends an audit entry.
    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
        actor: Actor,
    ) -> Result<(), PalaverError>;

    // --- Messages ---

    /// Appends a message. Returns [`InsertOutcome::Duplicate`] when the
    /// provider message id has already been stored.
    async fn insert_message(&self, msg: NewMessage) -> Result<InsertOutcome, PalaverError>;

    /// Most recent messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, PalaverError>;

    /// Records the outcome of an outbound send.
    async fn mark_outbound_result(
        &self,
        id: &MessageId,
        provider_message_id: Option<&str>,
        status: DeliveryStatus,
    ) -> Result<(), PalaverError>;

    /// Applies a provider delivery-status callback; never moves backwards.
    async fn update_delivery_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<StatusUpdate, PalaverError>;

    // --- Agents and assignment ---

    /// Agents of a tenant with their derived open-conversation counts.
    async fn list_agents(&self, tenant_id: &TenantId) -> Result<Vec<AgentLoad>, PalaverError>;

    /// Atomically selects an agent by strategy, checks capacity, and assigns
    /// the conversation to it. Returns `None` when no agent qualifies or the
    /// conversation is already assigned.
    async fn claim_agent(&self, claim: AssignmentClaim) -> Result<Option<Agent>, PalaverError>;

    /// Clears the assignment of every open conversation held by `agent_id`
    /// and returns the affected conversation ids.
    async fn release_agent_conversations(
        &self,
        tenant_id: &TenantId,
        agent_id: &AgentId,
        actor: Actor,
    ) -> Result<Vec<ConversationId>, PalaverError>;

    /// Returns `false` when the agent does not exist for that tenant.
    async fn set_agent_availability(
        &self,
        tenant_id: &TenantId,
        agent_id: &AgentId,
        available: bool,
    ) -> Result<bool, PalaverError>;

    // --- Notifications ---

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, PalaverError>;

    async fn list_notifications(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Notification>, PalaverError>;

    // --- Bookings and leads ---

    async fn create_booking(&self, booking: NewBooking) -> Result<BookingOutcome, PalaverError>;

    /// Moves a confirmed booking to a new slot.
    async fn reschedule_booking(
        &self,
        booking_id: &str,
        date: &str,
        time: &str,
    ) -> Result<BookingOutcome, PalaverError>;

    /// Returns `false` when there was no confirmed booking with that id.
    async fn cancel_booking(&self, booking_id: &str) -> Result<bool, PalaverError>;

    /// The customer's next confirmed booking on or after `today`.
    async fn upcoming_booking(
        &self,
        tenant_id: &TenantId,
        customer_phone: &str,
        today: &str,
    ) -> Result<Option<Booking>, PalaverError>;

    /// Confirmed bookings starting in `[from, until)` whose reminder has not
    /// been emitted yet. Bounds are `YYYY-MM-DD HH:MM` local slot strings.
    async fn due_reminders(&self, from: &str, until: &str) -> Result<Vec<Booking>, PalaverError>;

    async fn mark_reminder_sent(&self, booking_id: &str) -> Result<(), PalaverError>;

    /// Bookings still `confirmed` whose slot started before `before`
    /// (`YYYY-MM-DD HH:MM`).
    async fn lapsed_bookings(&self, before: &str) -> Result<Vec<Booking>, PalaverError>;

    /// Moves a confirmed booking to `no_show`. Returns `false` when it was no
    /// longer confirmed.
    async fn mark_no_show(&self, booking_id: &str) -> Result<bool, PalaverError>;

    async fn insert_lead(&self, lead: NewLead) -> Result<(), PalaverError>;
}
