// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every violation instead of failing on the first one.

use std::str::FromStr;

use palaver_core::Intent;

use crate::diagnostic::ConfigError;
use crate::model::{PalaverConfig, TierRate};

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &PalaverConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    validate_routing(config, &mut errors);

    for (name, rate) in [
        ("fast", &config.cost.fast),
        ("standard", &config.cost.standard),
        ("premium", &config.cost.premium),
    ] {
        validate_rate(name, rate, &mut errors);
    }

    let cache = &config.cache;
    for (key, value) in [
        ("cache.idempotency_ttl_secs", cache.idempotency_ttl_secs),
        ("cache.tenant_hit_ttl_secs", cache.tenant_hit_ttl_secs),
        ("cache.tenant_miss_ttl_secs", cache.tenant_miss_ttl_secs),
        ("flow.timeout_secs", config.flow.timeout_secs),
        ("pipeline.db_timeout_ms", config.pipeline.db_timeout_ms),
        ("pipeline.reminder_interval_secs", config.pipeline.reminder_interval_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be greater than 0")));
        }
    }
    if cache.idempotency_max_entries == 0 || cache.tenant_max_entries == 0 {
        errors.push(ConfigError::validation(
            "cache max_entries values must be greater than 0",
        ));
    }

    if config.flow.max_retries == 0 {
        errors.push(ConfigError::validation("flow.max_retries must be at least 1"));
    }

    if config.pipeline.fallback_reply.trim().is_empty() {
        errors.push(ConfigError::validation("pipeline.fallback_reply must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routing(config: &PalaverConfig, errors: &mut Vec<ConfigError>) {
    let routing = &config.routing;

    for (key, model) in [
        ("routing.fast_model", &routing.fast_model),
        ("routing.standard_model", &routing.standard_model),
        ("routing.premium_model", &routing.premium_model),
    ] {
        if model.trim().is_empty() {
            errors.push(ConfigError::validation(format!("{key} must not be empty")));
        }
    }

    for (key, value) in [
        ("routing.tier1_confidence_threshold", routing.tier1_confidence_threshold),
        ("routing.tier2_confidence_threshold", routing.tier2_confidence_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::validation(format!(
                "{key} must be between 0.0 and 1.0, got {value}"
            )));
        }
    }

    if routing.tier2_confidence_threshold > routing.tier1_confidence_threshold {
        errors.push(ConfigError::validation(format!(
            "routing.tier2_confidence_threshold ({}) must not exceed routing.tier1_confidence_threshold ({})",
            routing.tier2_confidence_threshold, routing.tier1_confidence_threshold
        )));
    }

    for intent in &routing.structured_intents {
        if Intent::from_str(intent).is_err() {
            errors.push(ConfigError::validation(format!(
                "routing.structured_intents contains unknown intent `{intent}`"
            )));
        }
    }

    if routing.ai_timeout_ms == 0 {
        errors.push(ConfigError::validation("routing.ai_timeout_ms must be greater than 0"));
    }
}

fn validate_rate(tier: &str, rate: &TierRate, errors: &mut Vec<ConfigError>) {
    if rate.input_per_mtok < 0.0 || rate.output_per_mtok < 0.0 {
        errors.push(ConfigError::validation(format!(
            "cost.{tier} rates must be non-negative"
        )));
    }
}
