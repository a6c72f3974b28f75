// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Palaver messaging pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Palaver configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PalaverConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// WhatsApp (Twilio) transport settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Intent routing tiers and thresholds.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Per-tier token pricing.
    #[serde(default)]
    pub cost: CostConfig,

    /// In-memory cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Structured flow behavior.
    #[serde(default)]
    pub flow: FlowConfig,

    /// Pipeline timeouts and canned replies.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Admin API settings.
    #[serde(default)]
    pub admin: AdminConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL (e.g. `https://hooks.example.com`).
    ///
    /// Webhook signatures are computed over the public URL, so this must match
    /// what is configured at the provider when running behind a proxy.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Expose Prometheus metrics on `/metrics`.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// How long shutdown waits for accepted webhooks to finish their turn.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            log_level: default_log_level(),
            metrics_enabled: true,
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("palaver").join("palaver.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("palaver.db"))
        .to_string_lossy()
        .into_owned()
}

/// WhatsApp transport configuration (Twilio API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Twilio account SID used for outbound sends.
    #[serde(default)]
    pub account_sid: Option<String>,

    /// Twilio auth token. Signs inbound webhooks and authenticates sends.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Base URL of the Twilio REST API.
    #[serde(default = "default_twilio_base_url")]
    pub api_base_url: String,

    /// Reject webhooks without a valid `X-Twilio-Signature`.
    #[serde(default = "default_true")]
    pub verify_signatures: bool,

    /// URL Twilio should post delivery-status callbacks to.
    #[serde(default)]
    pub status_callback_url: Option<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            api_base_url: default_twilio_base_url(),
            verify_signatures: true,
            status_callback_url: None,
        }
    }
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Base URL of the Anthropic API.
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_version: default_api_version(),
            base_url: default_anthropic_base_url(),
        }
    }
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

/// Intent routing configuration.
///
/// Every inbound message is classified by the fast model first; structured
/// intents and low-confidence results escalate to the standard model, and
/// escalation requests or very low confidence reach the premium model.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Tier 1 model.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Tier 2 model.
    #[serde(default = "default_standard_model")]
    pub standard_model: String,

    /// Tier 3 model.
    #[serde(default = "default_premium_model")]
    pub premium_model: String,

    /// Tier 1 results below this confidence escalate to tier 2.
    #[serde(default = "default_tier1_threshold")]
    pub tier1_confidence_threshold: f64,

    /// Tier 2 results below this confidence escalate to tier 3.
    #[serde(default = "default_tier2_threshold")]
    pub tier2_confidence_threshold: f64,

    /// Intents that always escalate to tier 2 because they start a flow.
    #[serde(default = "default_structured_intents")]
    pub structured_intents: Vec<String>,

    /// Max tokens for classification calls.
    #[serde(default = "default_classification_max_tokens")]
    pub classification_max_tokens: u32,

    /// Max tokens for reply generation calls.
    #[serde(default = "default_response_max_tokens")]
    pub response_max_tokens: u32,

    /// Upper bound on a single model call.
    #[serde(default = "default_ai_timeout_ms")]
    pub ai_timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fast_model: default_fast_model(),
            standard_model: default_standard_model(),
            premium_model: default_premium_model(),
            tier1_confidence_threshold: default_tier1_threshold(),
            tier2_confidence_threshold: default_tier2_threshold(),
            structured_intents: default_structured_intents(),
            classification_max_tokens: default_classification_max_tokens(),
            response_max_tokens: default_response_max_tokens(),
            ai_timeout_ms: default_ai_timeout_ms(),
        }
    }
}

fn default_fast_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_standard_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_premium_model() -> String {
    "claude-opus-4-1-20250805".to_string()
}

fn default_tier1_threshold() -> f64 {
    0.7
}

fn default_tier2_threshold() -> f64 {
    0.5
}

fn default_structured_intents() -> Vec<String> {
    vec![
        "BOOKING".to_string(),
        "LEAD_CAPTURE".to_string(),
        "CANCELLATION".to_string(),
    ]
}

fn default_classification_max_tokens() -> u32 {
    200
}

fn default_response_max_tokens() -> u32 {
    500
}

fn default_ai_timeout_ms() -> u64 {
    8_000
}

/// Token rates for one tier, in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierRate {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Cost tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Whether to persist per-call cost records.
    #[serde(default = "default_true")]
    pub track_tokens: bool,

    #[serde(default = "default_fast_rate")]
    pub fast: TierRate,

    #[serde(default = "default_standard_rate")]
    pub standard: TierRate,

    #[serde(default = "default_premium_rate")]
    pub premium: TierRate,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            track_tokens: true,
            fast: default_fast_rate(),
            standard: default_standard_rate(),
            premium: default_premium_rate(),
        }
    }
}

fn default_fast_rate() -> TierRate {
    TierRate {
        input_per_mtok: 1.0,
        output_per_mtok: 5.0,
    }
}

fn default_standard_rate() -> TierRate {
    TierRate {
        input_per_mtok: 3.0,
        output_per_mtok: 15.0,
    }
}

fn default_premium_rate() -> TierRate {
    TierRate {
        input_per_mtok: 15.0,
        output_per_mtok: 75.0,
    }
}

/// In-memory cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// How long a processed provider message id is remembered.
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Maximum remembered message ids.
    #[serde(default = "default_idempotency_max_entries")]
    pub idempotency_max_entries: usize,

    /// How long a resolved tenant stays cached.
    #[serde(default = "default_tenant_hit_ttl_secs")]
    pub tenant_hit_ttl_secs: u64,

    /// How long an unknown destination number stays cached.
    #[serde(default = "default_tenant_miss_ttl_secs")]
    pub tenant_miss_ttl_secs: u64,

    /// Maximum cached destination numbers.
    #[serde(default = "default_tenant_max_entries")]
    pub tenant_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            idempotency_max_entries: default_idempotency_max_entries(),
            tenant_hit_ttl_secs: default_tenant_hit_ttl_secs(),
            tenant_miss_ttl_secs: default_tenant_miss_ttl_secs(),
            tenant_max_entries: default_tenant_max_entries(),
        }
    }
}

fn default_idempotency_ttl_secs() -> u64 {
    600
}

fn default_idempotency_max_entries() -> usize {
    100_000
}

fn default_tenant_hit_ttl_secs() -> u64 {
    300
}

fn default_tenant_miss_ttl_secs() -> u64 {
    60
}

fn default_tenant_max_entries() -> usize {
    10_000
}

/// Structured flow configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Consecutive invalid inputs before a flow is abandoned.
    #[serde(default = "default_flow_max_retries")]
    pub max_retries: u32,

    /// Idle time after which an in-progress flow is abandoned.
    #[serde(default = "default_flow_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_flow_max_retries(),
            timeout_secs: default_flow_timeout_secs(),
        }
    }
}

fn default_flow_max_retries() -> u32 {
    3
}

fn default_flow_timeout_secs() -> u64 {
    1_800
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Upper bound on a single storage call.
    #[serde(default = "default_db_timeout_ms")]
    pub db_timeout_ms: u64,

    /// Messages of history given to the responder.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Reply sent when no model is reachable.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Reply sent when a conversation is handed to a human.
    #[serde(default = "default_handoff_reply")]
    pub handoff_reply: String,

    /// How often the booking reminder sweep runs.
    #[serde(default = "default_reminder_interval_secs")]
    pub reminder_interval_secs: u64,

    /// How far ahead the reminder sweep looks.
    #[serde(default = "default_reminder_horizon_hours")]
    pub reminder_horizon_hours: u32,

    /// Minutes after a slot's start before an unattended booking is
    /// reported as a no-show.
    #[serde(default = "default_no_show_grace_minutes")]
    pub no_show_grace_minutes: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_timeout_ms: default_db_timeout_ms(),
            history_limit: default_history_limit(),
            fallback_reply: default_fallback_reply(),
            handoff_reply: default_handoff_reply(),
            reminder_interval_secs: default_reminder_interval_secs(),
            reminder_horizon_hours: default_reminder_horizon_hours(),
            no_show_grace_minutes: default_no_show_grace_minutes(),
        }
    }
}

fn default_db_timeout_ms() -> u64 {
    5_000
}

fn default_history_limit() -> usize {
    10
}

fn default_fallback_reply() -> String {
    "Thanks for your message! We have received it and a member of our team will get back to you shortly.".to_string()
}

fn default_handoff_reply() -> String {
    "Let me connect you with a member of our team. Someone will be with you shortly.".to_string()
}

fn default_reminder_interval_secs() -> u64 {
    300
}

fn default_reminder_horizon_hours() -> u32 {
    24
}

fn default_no_show_grace_minutes() -> u32 {
    60
}

/// Admin API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    /// Bearer token for `/admin/*`. `None` disables the admin API.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PalaverConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.drain_timeout_secs, 30);
        assert_eq!(config.pipeline.no_show_grace_minutes, 60);
        assert_eq!(config.routing.tier1_confidence_threshold, 0.7);
        assert_eq!(config.routing.tier2_confidence_threshold, 0.5);
        assert_eq!(config.cache.idempotency_ttl_secs, 600);
        assert_eq!(config.cache.tenant_hit_ttl_secs, 300);
        assert_eq!(config.cache.tenant_miss_ttl_secs, 60);
        assert_eq!(config.flow.max_retries, 3);
        assert!(config.whatsapp.verify_signatures);
        assert!(config.admin.bearer_token.is_none());
    }

    #[test]
    fn default_structured_intents() {
        let config = RoutingConfig::default();
        assert_eq!(
            config.structured_intents,
            vec!["BOOKING", "LEAD_CAPTURE", "CANCELLATION"]
        );
    }
}
