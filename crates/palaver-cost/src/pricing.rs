// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier pricing and cost calculation.
//!
//! Cost is charged by the tier whose model actually served the call (after
//! any degradation down the ladder), at that tier's configured input and
//! output rates (USD per million tokens).

use palaver_config::model::{CostConfig, TierRate};
use palaver_core::{Tier, TokenUsage};

/// Token rates for all three routing tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPricing {
    fast: TierRate,
    standard: TierRate,
    premium: TierRate,
}

impl TierPricing {
    pub fn from_config(config: &CostConfig) -> Self {
        Self {
            fast: config.fast,
            standard: config.standard,
            premium: config.premium,
        }
    }

    pub fn rate(&self, tier: Tier) -> &TierRate {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Standard => &self.standard,
            Tier::Premium => &self.premium,
        }
    }

    /// Cost in USD of one call at `tier`.
    pub fn cost(&self, tier: Tier, usage: &TokenUsage) -> f64 {
        calculate_cost(usage, self.rate(tier))
    }
}

impl Default for TierPricing {
    fn default() -> Self {
        Self::from_config(&CostConfig::default())
    }
}

/// `input × input_rate + output × output_rate`, rates per million tokens.
pub fn calculate_cost(usage: &TokenUsage, rate: &TierRate) -> f64 {
    let input = (f64::from(usage.input_tokens) / 1_000_000.0) * rate.input_per_mtok;
    let output = (f64::from(usage.output_tokens) / 1_000_000.0) * rate.output_per_mtok;
    input + output
}
