// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Appointment booking: service, date, time, confirmation.
//!
//! When the customer already holds an upcoming booking, confirming moves that
//! booking instead of creating a second one.

use chrono::NaiveDate;
use palaver_core::FlowKind;
use serde::{Deserialize, Serialize};

use crate::definition::{FlowContext, FlowDefinition, SideEffect, Step, Transition};
use crate::parse::{parse_date, parse_time, parse_yes_no};

const DEFAULT_SERVICE: &str = "Appointment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BookingState {
    CollectingService,
    CollectingDate {
        service: String,
    },
    CollectingTime {
        service: String,
        date: String,
    },
    Confirming {
        service: String,
        date: String,
        time: String,
    },
}

pub struct BookingFlow;

fn display_date(date: &str) -> String {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%A %d %B %Y").to_string())
        .unwrap_or_else(|_| date.to_string())
}

fn service_menu(services: &[String]) -> String {
    services
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Match a reply against the tenant's services by number or name.
fn match_service(input: &str, services: &[String]) -> Option<String> {
    let lower = input.trim().to_lowercase();
    if let Ok(n) = lower.trim_end_matches('.').parse::<usize>() {
        return n.checked_sub(1).and_then(|i| services.get(i)).cloned();
    }
    services
        .iter()
        .find(|s| lower.contains(&s.to_lowercase()))
        .or_else(|| {
            services
                .iter()
                .find(|s| lower.len() >= 3 && s.to_lowercase().contains(&lower))
        })
        .cloned()
}

fn ask_date(service: &str) -> String {
    format!("Great, {service}. Which date would suit you? (e.g. \"tomorrow\", \"friday\" or 25/03)")
}

fn ask_time(date: &str) -> String {
    format!(
        "What time on {} works for you? (e.g. 10:30 or 3pm)",
        display_date(date)
    )
}

fn ask_confirmation(service: &str, date: &str, time: &str, ctx: &FlowContext) -> String {
    match &ctx.upcoming_booking {
        Some(existing) => format!(
            "To confirm: move your {} from {} at {} to {} at {}? Reply YES to confirm or NO to pick another date.",
            existing.service,
            display_date(&existing.date),
            existing.time,
            display_date(date),
            time
        ),
        None => format!(
            "To confirm: {service} on {} at {time}? Reply YES to confirm or NO to pick another date.",
            display_date(date)
        ),
    }
}

impl BookingFlow {
    fn after_service(service: String, trigger: &str, ctx: &FlowContext) -> Transition {
        match parse_date(trigger, ctx.today).filter(|d| *d >= ctx.today) {
            Some(date) => {
                let date = date.format("%Y-%m-%d").to_string();
                let reply = ask_time(&date);
                Transition::next(&BookingState::CollectingTime { service, date }, reply)
            }
            None => {
                let reply = ask_date(&service);
                Transition::next(&BookingState::CollectingDate { service }, reply)
            }
        }
    }

    fn step(&self, state: BookingState, input: &str, ctx: &FlowContext) -> Transition {
        match state {
            BookingState::CollectingService => match match_service(input, &ctx.services) {
                Some(service) => Self::after_service(service, input, ctx),
                None => Transition::retry(format!(
                    "Sorry, I didn't catch which service. Please reply with a number:\n{}",
                    service_menu(&ctx.services)
                )),
            },
            BookingState::CollectingDate { service } => match parse_date(input, ctx.today) {
                Some(date) if date < ctx.today => {
                    Transition::retry("That date has already passed. Which upcoming date would suit you?")
                }
                Some(date) => {
                    let date = date.format("%Y-%m-%d").to_string();
                    let reply = ask_time(&date);
                    Transition::next(&BookingState::CollectingTime { service, date }, reply)
                }
                None => Transition::retry(
                    "Sorry, I didn't understand that date. Please reply with a date like \"tomorrow\", \"friday\" or 25/03.",
                ),
            },
            BookingState::CollectingTime { service, date } => match parse_time(input) {
                Some(time) => {
                    let time = time.format("%H:%M").to_string();
                    let reply = ask_confirmation(&service, &date, &time, ctx);
                    Transition::next(
                        &BookingState::Confirming {
                            service,
                            date,
                            time,
                        },
                        reply,
                    )
                }
                None => Transition::retry(
                    "Sorry, I didn't understand that time. Please reply with a time like 10:30 or 3pm.",
                ),
            },
            BookingState::Confirming {
                service,
                date,
                time,
            } => match parse_yes_no(input) {
                Some(true) => {
                    let reply = format!(
                        "You're booked: {service} on {} at {time}. See you then!",
                        display_date(&date)
                    );
                    let effect = match &ctx.upcoming_booking {
                        Some(existing) => SideEffect::RescheduleBooking {
                            booking_id: existing.id.clone(),
                            service,
                            date,
                            time,
                        },
                        None => SideEffect::CreateBooking {
                            service,
                            date,
                            time,
                        },
                    };
                    Transition::completed(reply, vec![effect])
                }
                Some(false) => Transition::next(
                    &BookingState::CollectingDate { service },
                    "No problem. Which other date would suit you?",
                ),
                None => Transition::retry("Please reply YES to confirm or NO to pick another date."),
            },
        }
    }
}

impl FlowDefinition for BookingFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Booking
    }

    fn start(&self, trigger: &str, ctx: &FlowContext) -> Transition {
        if ctx.services.is_empty() {
            return Self::after_service(DEFAULT_SERVICE.to_string(), trigger, ctx);
        }
        if let Some(service) = match_service(trigger, &ctx.services) {
            return Self::after_service(service, trigger, ctx);
        }
        let intro = match &ctx.upcoming_booking {
            Some(existing) => format!(
                "You already have {} booked on {} at {}; I'll move it for you. ",
                existing.service,
                display_date(&existing.date),
                existing.time
            ),
            None => String::new(),
        };
        Transition::next(
            &BookingState::CollectingService,
            format!(
                "{intro}Which service would you like to book?\n{}",
                service_menu(&ctx.services)
            ),
        )
    }

    fn advance(&self, state: &serde_json::Value, input: &str, ctx: &FlowContext) -> Transition {
        match serde_json::from_value::<BookingState>(state.clone()) {
            Ok(state) => self.step(state, input, ctx),
            Err(_) => Transition {
                step: Step::Abandoned,
                reply: "Sorry, I lost track of your booking. A member of our team will follow up with you.".into(),
                side_effects: vec![SideEffect::FlagForHuman {
                    reason: "unreadable booking state".into(),
                }],
            },
        }
    }
}
