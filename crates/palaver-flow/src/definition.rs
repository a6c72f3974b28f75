// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract every structured flow implements.

use chrono::NaiveDate;
use palaver_core::{Booking, FlowKind};
use serde::{Deserialize, Serialize};

/// Read-only facts a flow may consult while handling a turn.
#[derive(Debug, Clone)]
pub struct FlowContext {
    /// Tenant's current date, used to resolve relative dates.
    pub today: NaiveDate,
    /// Services the tenant offers, in display order.
    pub services: Vec<String>,
    /// The customer's next confirmed booking with this tenant, if any.
    pub upcoming_booking: Option<Booking>,
    /// Name from the customer's WhatsApp profile.
    pub customer_name: Option<String>,
}

/// A durable action requested by a flow, applied by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    CreateBooking {
        service: String,
        date: String,
        time: String,
    },
    RescheduleBooking {
        booking_id: String,
        service: String,
        date: String,
        time: String,
    },
    CancelBooking {
        booking_id: String,
        service: String,
        date: String,
        time: String,
    },
    CaptureLead {
        name: String,
        email: Option<String>,
        interest: Option<String>,
    },
    /// Hand the conversation to a human.
    FlagForHuman { reason: String },
}

/// Where a flow goes after one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Move to (or stay in) a valid state.
    Continue(serde_json::Value),
    /// The input was not understood; stay put and re-prompt.
    Retry,
    Completed,
    Abandoned,
}

/// The result of one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub step: Step,
    pub reply: String,
    pub side_effects: Vec<SideEffect>,
}

impl Transition {
    pub fn next<S: Serialize>(state: &S, reply: impl Into<String>) -> Self {
        let step = match serde_json::to_value(state) {
            Ok(value) => Step::Continue(value),
            Err(_) => Step::Abandoned,
        };
        Self {
            step,
            reply: reply.into(),
            side_effects: Vec::new(),
        }
    }

    pub fn retry(reply: impl Into<String>) -> Self {
        Self {
            step: Step::Retry,
            reply: reply.into(),
            side_effects: Vec::new(),
        }
    }

    pub fn completed(reply: impl Into<String>, side_effects: Vec<SideEffect>) -> Self {
        Self {
            step: Step::Completed,
            reply: reply.into(),
            side_effects,
        }
    }

    pub fn abandoned(reply: impl Into<String>) -> Self {
        Self {
            step: Step::Abandoned,
            reply: reply.into(),
            side_effects: Vec::new(),
        }
    }
}

/// A multi-turn state machine.
///
/// Each definition owns a typed state enum and stores it as JSON on the
/// conversation between turns. Implementations must not panic on any input;
/// unrecognized answers return [`Step::Retry`].
pub trait FlowDefinition: Send + Sync {
    fn kind(&self) -> FlowKind;

    /// Enter the flow. `trigger` is the message that selected it and may
    /// already answer the first question.
    fn start(&self, trigger: &str, ctx: &FlowContext) -> Transition;

    /// Handle one customer message in `state`.
    fn advance(&self, state: &serde_json::Value, input: &str, ctx: &FlowContext) -> Transition;

    /// Whether a bare "cancel"/"stop" leaves this flow. Flows whose own
    /// question is about cancelling interpret those words themselves.
    fn exits_on_cancel_words(&self) -> bool {
        true
    }
}
