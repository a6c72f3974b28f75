// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.

use metrics::{describe_counter, describe_histogram};

/// Register all Palaver metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "palaver_inbound_total",
        "Inbound webhook events by pipeline outcome"
    );
    describe_counter!(
        "palaver_tier_calls_total",
        "AI model calls by requested tier, serving tier and outcome"
    );
    describe_counter!("palaver_tokens_total", "Tokens consumed by tier");
    describe_counter!(
        "palaver_provider_unavailable_total",
        "Turns where every model call failed and the fallback reply was sent"
    );
    describe_counter!(
        "palaver_assignments_total",
        "Auto-assignment attempts by result"
    );
    describe_counter!(
        "palaver_status_callbacks_total",
        "Delivery-status callbacks by outcome"
    );
    describe_counter!(
        "palaver_notifications_total",
        "Dashboard notifications emitted by kind"
    );
    describe_histogram!(
        "palaver_turn_latency_seconds",
        "Time from webhook receipt to reply hand-off"
    );
}

/// Record a handled inbound event (`processed`, `duplicate`, `tenant_not_found`, `failed`).
pub fn record_inbound(outcome: &str) {
    metrics::counter!("palaver_inbound_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record one model call of the tier ladder.
pub fn record_tier_call(requested: &str, served_by: &str, outcome: &str) {
    metrics::counter!(
        "palaver_tier_calls_total",
        "requested" => requested.to_string(),
        "served_by" => served_by.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record token consumption.
pub fn record_tokens(tier: &str, input: u32, output: u32) {
    metrics::counter!("palaver_tokens_total", "tier" => tier.to_string(), "type" => "input")
        .increment(input as u64);
    metrics::counter!("palaver_tokens_total", "tier" => tier.to_string(), "type" => "output")
        .increment(output as u64);
}

pub fn record_provider_unavailable() {
    metrics::counter!("palaver_provider_unavailable_total").increment(1);
}

/// Record an auto-assignment attempt (`assigned`, `no_candidate`, `error`).
pub fn record_assignment(result: &str) {
    metrics::counter!("palaver_assignments_total", "result" => result.to_string()).increment(1);
}

pub fn record_status_callback(outcome: &str) {
    metrics::counter!("palaver_status_callbacks_total", "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_notification(kind: &str) {
    metrics::counter!("palaver_notifications_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_turn_latency(seconds: f64) {
    metrics::histogram!("palaver_turn_latency_seconds").record(seconds);
}
