// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs flow definitions against persisted [`FlowSnapshot`]s.
//!
//! The executor owns the cross-cutting rules: cancel words, bounded retries
//! on unrecognized input, and idle expiry. Definitions only describe their
//! own states.

use chrono::{DateTime, Utc};
use palaver_config::model::FlowConfig;
use palaver_core::{FlowKind, FlowSnapshot, PalaverError, format_timestamp, parse_timestamp};
use tracing::{debug, info};

use crate::definition::{FlowContext, SideEffect, Step, Transition};
use crate::parse::is_cancel_request;
use crate::registry::FlowRegistry;

const DEFAULT_HANDOFF: &str = "Sorry, I'm having trouble understanding. A member of our team will get back to you shortly.";
const CANCELLED_REPLY: &str = "No problem, I've stopped there. Is there anything else I can help with?";

/// Where the flow stands after a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStatus {
    /// Still running; persist this snapshot.
    Active(FlowSnapshot),
    Completed,
    Abandoned,
}

/// The outcome of one executor turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTurn {
    pub kind: FlowKind,
    pub status: FlowStatus,
    pub reply: String,
    pub side_effects: Vec<SideEffect>,
}

impl FlowTurn {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, FlowStatus::Active(_))
    }

    /// Snapshot to persist, `None` once the flow has ended.
    pub fn snapshot(&self) -> Option<&FlowSnapshot> {
        match &self.status {
            FlowStatus::Active(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Whether the turn asked for a human to take over.
    pub fn needs_human(&self) -> bool {
        self.side_effects
            .iter()
            .any(|e| matches!(e, SideEffect::FlagForHuman { .. }))
    }
}

pub struct FlowExecutor {
    registry: FlowRegistry,
    max_retries: u32,
    timeout: chrono::Duration,
    handoff_reply: String,
}

impl FlowExecutor {
    /// Build an executor; fails if the registry is incomplete.
    pub fn new(registry: FlowRegistry, config: &FlowConfig) -> Result<Self, PalaverError> {
        registry.validate()?;
        Ok(Self {
            registry,
            max_retries: config.max_retries.max(1),
            timeout: chrono::Duration::seconds(config.timeout_secs.min(u32::MAX as u64) as i64),
            handoff_reply: DEFAULT_HANDOFF.to_string(),
        })
    }

    /// Reply sent when a flow is abandoned after too many retries.
    pub fn with_handoff_reply(mut self, reply: impl Into<String>) -> Self {
        self.handoff_reply = reply.into();
        self
    }

    /// Whether the flow has been idle longer than the flow timeout.
    /// Snapshots with an unreadable timestamp count as expired.
    pub fn is_expired(&self, snapshot: &FlowSnapshot, now: DateTime<Utc>) -> bool {
        match parse_timestamp(&snapshot.updated_at) {
            Some(updated) => now - updated > self.timeout,
            None => true,
        }
    }

    /// Enter `kind` for a conversation that has no active flow.
    pub fn start(
        &self,
        kind: FlowKind,
        trigger: &str,
        ctx: &FlowContext,
        now: DateTime<Utc>,
    ) -> FlowTurn {
        let Some(definition) = self.registry.get(kind) else {
            return self.missing_definition(kind);
        };
        let transition = definition.start(trigger, ctx);
        let stamp = format_timestamp(now);
        let turn = match transition.step {
            Step::Continue(state) => FlowTurn {
                kind,
                status: FlowStatus::Active(FlowSnapshot {
                    kind,
                    state,
                    retries: 0,
                    started_at: stamp.clone(),
                    updated_at: stamp,
                }),
                reply: transition.reply,
                side_effects: transition.side_effects,
            },
            step => self.terminal(kind, step, transition.reply, transition.side_effects),
        };
        debug!(flow = %kind, terminal = turn.is_terminal(), "flow started");
        turn
    }

    /// Feed one customer message to the active flow.
    pub fn handle(
        &self,
        snapshot: &FlowSnapshot,
        input: &str,
        ctx: &FlowContext,
        now: DateTime<Utc>,
    ) -> FlowTurn {
        let kind = snapshot.kind;
        let Some(definition) = self.registry.get(kind) else {
            return self.missing_definition(kind);
        };

        if definition.exits_on_cancel_words() && is_cancel_request(input) {
            info!(flow = %kind, "flow cancelled by customer");
            return FlowTurn {
                kind,
                status: FlowStatus::Abandoned,
                reply: CANCELLED_REPLY.to_string(),
                side_effects: Vec::new(),
            };
        }

        let Transition {
            step,
            reply,
            side_effects,
        } = definition.advance(&snapshot.state, input, ctx);

        match step {
            Step::Continue(state) => FlowTurn {
                kind,
                status: FlowStatus::Active(FlowSnapshot {
                    kind,
                    state,
                    retries: 0,
                    started_at: snapshot.started_at.clone(),
                    updated_at: format_timestamp(now),
                }),
                reply,
                side_effects,
            },
            Step::Retry => {
                let retries = snapshot.retries + 1;
                if retries >= self.max_retries {
                    info!(flow = %kind, retries, "flow abandoned after repeated unrecognized input");
                    return FlowTurn {
                        kind,
                        status: FlowStatus::Abandoned,
                        reply: self.handoff_reply.clone(),
                        side_effects: vec![SideEffect::FlagForHuman {
                            reason: format!(
                                "{kind} flow abandoned after {retries} unrecognized replies"
                            ),
                        }],
                    };
                }
                debug!(flow = %kind, retries, "flow input not understood, re-prompting");
                FlowTurn {
                    kind,
                    status: FlowStatus::Active(FlowSnapshot {
                        kind,
                        state: snapshot.state.clone(),
                        retries,
                        started_at: snapshot.started_at.clone(),
                        updated_at: format_timestamp(now),
                    }),
                    reply,
                    side_effects,
                }
            }
            step => self.terminal(kind, step, reply, side_effects),
        }
    }

    fn terminal(
        &self,
        kind: FlowKind,
        step: Step,
        reply: String,
        side_effects: Vec<SideEffect>,
    ) -> FlowTurn {
        let status = match step {
            Step::Completed => FlowStatus::Completed,
            _ => FlowStatus::Abandoned,
        };
        info!(flow = %kind, ?status, effects = side_effects.len(), "flow ended");
        FlowTurn {
            kind,
            status,
            reply,
            side_effects,
        }
    }

    fn missing_definition(&self, kind: FlowKind) -> FlowTurn {
        FlowTurn {
            kind,
            status: FlowStatus::Abandoned,
            reply: self.handoff_reply.clone(),
            side_effects: vec![SideEffect::FlagForHuman {
                reason: format!("no definition for {kind} flow"),
            }],
        }
    }
}
