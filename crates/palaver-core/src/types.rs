// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the pipeline, storage, and adapter crates.
//!
//! Timestamps are ISO 8601 UTC strings (`%Y-%m-%dT%H:%M:%S%.3fZ`) so that
//! they sort lexicographically in SQLite; booking dates and times use
//! `YYYY-MM-DD` and `HH:MM`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current UTC time in the canonical storage format.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

/// Format a UTC instant in the canonical storage format.
pub fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a canonical storage timestamp. Accepts any RFC 3339 string.
pub fn parse_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a business account.
    TenantId
);
string_id!(
    /// Identifier of a conversation thread.
    ConversationId
);
string_id!(
    /// Identifier of a human support agent.
    AgentId
);
string_id!(
    /// Identifier of a persisted message row (not the provider's message id).
    MessageId
);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
    Channel,
}

/// Who performed a conversation mutation. Recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// The inbound message pipeline.
    Pipeline,
    /// A structured flow completing or abandoning.
    Flow,
    /// A human acting through the dashboard or admin API.
    Dashboard,
}

// --- Inbound events ---

/// A media attachment referenced by an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub content_type: Option<String>,
}

/// A validated inbound WhatsApp message, produced by the webhook parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Provider-assigned message id (e.g. Twilio `MessageSid`). Dedup key.
    pub provider_message_id: String,
    /// Canonical sender phone (digits only).
    pub from: String,
    /// Canonical destination phone (digits only). Resolves the tenant.
    pub to: String,
    pub body: String,
    pub profile_name: Option<String>,
    pub media: Vec<MediaRef>,
    pub received_at: String,
}

/// A delivery-status callback for a previously sent outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCallback {
    pub provider_message_id: String,
    pub status: DeliveryStatus,
    pub error_code: Option<String>,
}

// --- Tenants ---

/// How conversations are distributed to human agents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Never auto-assign.
    #[default]
    Manual,
    /// Agent with the oldest (or no) previous assignment.
    RoundRobin,
    /// Agent with the lowest active/capacity ratio.
    LeastBusy,
}

/// A frequently asked question with its canned answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// A business account and the settings the pipeline needs to serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Canonical destination number. At most one tenant per number.
    pub whatsapp_number: Option<String>,
    pub business_info: Option<String>,
    pub services: Vec<String>,
    /// Active FAQs only.
    pub faqs: Vec<Faq>,
    pub assignment_strategy: AssignmentStrategy,
    pub auto_assign: bool,
    pub is_active: bool,
}

impl Tenant {
    /// Whether the assignment engine should run for this tenant.
    pub fn auto_assign_enabled(&self) -> bool {
        self.auto_assign && self.assignment_strategy != AssignmentStrategy::Manual
    }
}

// --- Conversations ---

/// Lifecycle status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Resolved,
    Escalated,
    Archived,
}

impl ConversationStatus {
    /// Open conversations receive new inbound messages and count toward agent load.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Escalated)
    }
}

/// The structured flows the flow executor knows about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Booking,
    LeadCapture,
    Cancellation,
}

impl FlowKind {
    pub const ALL: [FlowKind; 3] = [FlowKind::Booking, FlowKind::LeadCapture, FlowKind::Cancellation];
}

/// Persisted snapshot of an in-progress flow on a conversation.
///
/// `state` is the flow's own typed state serialized as JSON; only the flow
/// executor interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub kind: FlowKind,
    pub state: serde_json::Value,
    /// Consecutive invalid inputs in the current step.
    pub retries: u32,
    pub started_at: String,
    pub updated_at: String,
}

/// A conversation between a tenant and one customer phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub status: ConversationStatus,
    pub flow: Option<FlowSnapshot>,
    pub assigned_agent_id: Option<AgentId>,
    pub assigned_at: Option<String>,
    pub lead_score: Option<i64>,
    pub lead_status: Option<String>,
    pub needs_human: bool,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A partial update to the mutable fields of a conversation.
///
/// `None` leaves a field untouched; `flow: Some(None)` clears the active flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationUpdate {
    pub status: Option<ConversationStatus>,
    pub flow: Option<Option<FlowSnapshot>>,
    pub needs_human: Option<bool>,
    pub lead_score: Option<i64>,
    pub lead_status: Option<String>,
    pub last_message_at: Option<String>,
}

impl ConversationUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Short machine-readable summary for the audit trail.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status={status}"));
        }
        match &self.flow {
            Some(Some(flow)) => parts.push(format!("flow={}", flow.kind)),
            Some(None) => parts.push("flow=none".to_string()),
            None => {}
        }
        if let Some(needs_human) = self.needs_human {
            parts.push(format!("needs_human={needs_human}"));
        }
        if let Some(score) = self.lead_score {
            parts.push(format!("lead_score={score}"));
        }
        if let Some(status) = &self.lead_status {
            parts.push(format!("lead_status={status}"));
        }
        if self.last_message_at.is_some() {
            parts.push("last_message_at".to_string());
        }
        parts.join(",")
    }
}

// --- Messages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Delivery lifecycle of a message as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    ///
    /// Callbacks can arrive out of order; statuses only move forward
    /// (`queued < sent < delivered < read`), and `failed` is accepted from
    /// any non-failed status.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        if next == Self::Failed {
            return self != Self::Failed;
        }
        self != Self::Failed && next.rank() > self.rank()
    }
}

/// The routing tier that produced a classification or reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1: fast, cheap model.
    Fast,
    /// Tier 2: balanced model.
    Standard,
    /// Tier 3: most capable model.
    Premium,
}

impl Tier {
    pub fn level(self) -> u8 {
        match self {
            Self::Fast => 1,
            Self::Standard => 2,
            Self::Premium => 3,
        }
    }

    /// The next cheaper tier, used when a call at this tier fails.
    pub fn cheaper(self) -> Option<Tier> {
        match self {
            Self::Fast => None,
            Self::Standard => Some(Self::Fast),
            Self::Premium => Some(Self::Standard),
        }
    }
}

/// Classified purpose of an inbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Greeting,
    Faq,
    Booking,
    Cancellation,
    LeadCapture,
    /// The customer wants (or needs) a human.
    Escalate,
    General,
}

impl Intent {
    /// The structured flow that handles this intent, if any.
    pub fn flow(self) -> Option<FlowKind> {
        match self {
            Self::Booking => Some(FlowKind::Booking),
            Self::LeadCapture => Some(FlowKind::LeadCapture),
            Self::Cancellation => Some(FlowKind::Cancellation),
            _ => None,
        }
    }
}

/// A message to be appended to a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub direction: Direction,
    pub content: String,
    pub provider_message_id: Option<String>,
    pub intent: Option<Intent>,
    pub confidence: Option<f64>,
    pub tier: Option<Tier>,
    pub status: DeliveryStatus,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub direction: Direction,
    pub content: String,
    pub provider_message_id: Option<String>,
    pub intent: Option<Intent>,
    pub confidence: Option<f64>,
    pub tier: Option<Tier>,
    pub status: DeliveryStatus,
    pub created_at: String,
}

/// Result of appending a message.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Message),
    /// A message with the same provider message id already exists.
    Duplicate,
}

/// Result of applying a delivery-status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    /// The message exists but the status would move backwards.
    Ignored,
    /// No message carries that provider id.
    UnknownMessage,
}

// --- Agents ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Owner,
    Admin,
    Agent,
}

/// A human support agent belonging to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub name: String,
    pub role: AgentRole,
    pub is_available: bool,
    pub max_conversations: u32,
    pub last_assigned_at: Option<String>,
}

/// An agent together with its derived count of open assigned conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLoad {
    pub agent: Agent,
    pub active_count: u32,
}

/// Parameters for an atomic select-and-claim of an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentClaim {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub strategy: AssignmentStrategy,
    /// Agent to skip (used when reassigning away from an agent).
    pub exclude_agent: Option<AgentId>,
    pub actor: Actor,
}

// --- Notifications ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewBooking,
    BookingCancelled,
    BookingUpdated,
    ReminderPending,
    NoShow,
    Escalation,
    NewLead,
}

/// A dashboard notification to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub tenant_id: TenantId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub booking_id: Option<String>,
    pub conversation_id: Option<ConversationId>,
}

/// A persisted dashboard notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub tenant_id: TenantId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub booking_id: Option<String>,
    pub conversation_id: Option<ConversationId>,
    pub is_read: bool,
    pub created_at: String,
}

// --- Bookings and leads ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    /// Set from the dashboard once the customer attended.
    Completed,
    NoShow,
}

/// An appointment slot held by a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub tenant_id: TenantId,
    pub conversation_id: Option<ConversationId>,
    pub customer_phone: String,
    pub service: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// `HH:MM`.
    pub time: String,
    pub status: BookingStatus,
    pub reminder_sent: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub tenant_id: TenantId,
    pub conversation_id: Option<ConversationId>,
    pub customer_phone: String,
    pub service: String,
    pub date: String,
    pub time: String,
}

/// Result of trying to hold a slot. A taken slot is a business outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked(Booking),
    SlotTaken,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub name: String,
    pub email: Option<String>,
    pub interest: Option<String>,
}

// --- Cost ---

/// Which pipeline stage an AI call served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CostFeature {
    Classification,
    Response,
}

// --- Provider types ---

/// Token usage reported by an AI provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One turn of prompt history sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// A completion request to an AI provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
}

/// A completed response from an AI provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub stop_reason: Option<String>,
}

// --- Outbound ---

/// A reply to be delivered through the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Tenant's canonical WhatsApp number.
    pub from: String,
    /// Customer's canonical phone number.
    pub to: String,
    pub body: String,
}
