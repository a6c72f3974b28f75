// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracking for the Palaver messaging pipeline.
//!
//! - **Pricing**: per-tier token rates from configuration
//! - **Cost ledger**: one persisted record per AI call, with per-tenant daily totals

pub mod ledger;
pub mod pricing;

pub use ledger::{CostLedger, CostRecord};
pub use pricing::{TierPricing, calculate_cost};
