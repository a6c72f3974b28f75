// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking cancellation with a single confirmation step.

use palaver_core::FlowKind;
use serde::{Deserialize, Serialize};

use crate::definition::{FlowContext, FlowDefinition, SideEffect, Step, Transition};
use crate::parse::{is_cancel_request, parse_yes_no};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CancellationState {
    Confirming {
        booking_id: String,
        service: String,
        date: String,
        time: String,
    },
}

pub struct CancellationFlow;

impl FlowDefinition for CancellationFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Cancellation
    }

    fn start(&self, _trigger: &str, ctx: &FlowContext) -> Transition {
        let Some(booking) = &ctx.upcoming_booking else {
            return Transition::completed(
                "I couldn't find an upcoming booking under this number. Is there anything else I can help with?",
                Vec::new(),
            );
        };
        Transition::next(
            &CancellationState::Confirming {
                booking_id: booking.id.clone(),
                service: booking.service.clone(),
                date: booking.date.clone(),
                time: booking.time.clone(),
            },
            format!(
                "You have {} booked on {} at {}. Reply YES to cancel it or NO to keep it.",
                booking.service, booking.date, booking.time
            ),
        )
    }

    fn advance(&self, state: &serde_json::Value, input: &str, _ctx: &FlowContext) -> Transition {
        let Ok(CancellationState::Confirming {
            booking_id,
            service,
            date,
            time,
        }) = serde_json::from_value::<CancellationState>(state.clone())
        else {
            return Transition {
                step: Step::Abandoned,
                reply: "Sorry, something went wrong. A member of our team will follow up with you.".into(),
                side_effects: vec![SideEffect::FlagForHuman {
                    reason: "unreadable cancellation state".into(),
                }],
            };
        };

        // "cancel" answers the question here rather than leaving the flow.
        let answer = if is_cancel_request(input) {
            Some(true)
        } else {
            parse_yes_no(input)
        };
        match answer {
            Some(true) => Transition::completed(
                format!("Your {service} on {date} at {time} has been cancelled."),
                vec![SideEffect::CancelBooking {
                    booking_id,
                    service,
                    date,
                    time,
                }],
            ),
            Some(false) => Transition::completed(
                format!("No problem, your {service} on {date} at {time} is still booked."),
                Vec::new(),
            ),
            None => Transition::retry("Please reply YES to cancel your booking or NO to keep it."),
        }
    }

    fn exits_on_cancel_words(&self) -> bool {
        false
    }
}
