// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent routing for inbound customer messages.
//!
//! Every message is classified by the fast tier first. Messages that will
//! start a structured flow, or that the fast tier is unsure about, are
//! re-classified by the standard tier; escalation requests and very uncertain
//! results reach the premium tier. A failing tier degrades to the next cheaper
//! model, and a zero-cost keyword heuristic covers a fully unreachable
//! provider.

pub mod heuristic;
pub mod ladder;
pub mod prompt;
pub mod router;

pub use heuristic::{HeuristicClassifier, HeuristicResult};
pub use ladder::{CallOutcome, LadderOutcome, ModelLadder, TierCall, TierModels};
pub use router::{IntentRouter, RouteContext, RoutingDecision};
