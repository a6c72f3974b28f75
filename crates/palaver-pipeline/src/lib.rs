// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Palaver inbound pipeline.
//!
//! [`Pipeline`] owns one instance of every stage (idempotency guard, tenant
//! resolver, intent router, flow executor, responder, assignment engine,
//! notifier) and runs a WhatsApp event through them under a
//! per-conversation lock.

pub mod assignment;
pub mod idempotency;
pub mod locks;
pub mod notifier;
pub mod orchestrator;
pub mod reminders;
pub mod responder;
pub mod tenant_resolver;

#[cfg(test)]
pub(crate) mod test_support;

pub use assignment::{AssignmentEngine, AssignmentResult, AvailabilityChange, ReassignmentReport};
pub use idempotency::IdempotencyGuard;
pub use locks::{ConversationGuard, ConversationLocks};
pub use notifier::{BookingRef, NotificationPayload, Notifier};
pub use orchestrator::{HandledBy, Pipeline, PipelineOutcome, StatusOutcome, TurnSummary};
pub use reminders::ReminderSweep;
pub use responder::{Responder, ResponderOutcome};
pub use tenant_resolver::{ResolverStats, TenantResolver};
