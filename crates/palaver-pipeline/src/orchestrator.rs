// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end handling of one inbound WhatsApp event.
//!
//! Order of a turn:
//!
//! 1. idempotency guard, tenant resolution (outside the lock)
//! 2. under the per-conversation lock: upsert the conversation, load history,
//!    run the active flow or route and respond, persist the inbound message
//!    (a storage-level duplicate stops the turn here), apply side effects,
//!    persist the queued reply, update the conversation
//! 3. after the lock: send, record the delivery result, auto-assign, record
//!    costs and metrics
//!
//! Every dependency failure degrades to a reply; nothing here panics or
//! propagates an error to the webhook handler.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use palaver_config::model::PalaverConfig;
use palaver_core::{
    Actor, AgentId, BookingOutcome, ChannelAdapter, Conversation, ConversationId,
    ConversationStatus, ConversationUpdate, CostFeature, DeliveryStatus, Direction, FlowKind,
    FlowSnapshot, InboundEvent, InsertOutcome, Intent, MessageId, NewBooking, NewLead, NewMessage,
    OutboundMessage, PalaverError, ProviderAdapter, ProviderMessage, StatusCallback, StatusUpdate,
    StorageAdapter, Tenant, TenantId, Tier, format_timestamp, normalize_phone,
};
use palaver_cost::{CostLedger, CostRecord, TierPricing};
use palaver_flow::{FlowContext, FlowExecutor, FlowRegistry, FlowTurn, SideEffect};
use palaver_prometheus::{
    record_inbound, record_provider_unavailable, record_status_callback, record_tier_call,
    record_tokens, record_turn_latency,
};
use palaver_router::{IntentRouter, ModelLadder, RouteContext, RoutingDecision, TierCall};
use tracing::{debug, error, info, warn};

use crate::assignment::AssignmentEngine;
use crate::idempotency::IdempotencyGuard;
use crate::locks::ConversationLocks;
use crate::notifier::{BookingRef, NotificationPayload, Notifier};
use crate::responder::Responder;
use crate::tenant_resolver::TenantResolver;

const SAVE_FAILED_REPLY: &str = "Sorry, I couldn't save that just now. A member of our team will confirm with you shortly.";
const BOOKING_GONE_REPLY: &str = "Sorry, I couldn't find that booking any more. A member of our team will follow up with you.";
const ALREADY_CANCELLED_REPLY: &str = "That booking had already been cancelled. Is there anything else I can help with?";

/// What produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandledBy {
    Flow(FlowKind),
    Responder,
    /// Answered directly from an FAQ without a model call.
    FaqAnswer,
    /// No model was reachable; the generic fallback reply was sent.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    pub conversation_id: ConversationId,
    pub reply: String,
    pub handled_by: HandledBy,
    pub intent: Option<Intent>,
    pub tier: Option<Tier>,
    pub sent: bool,
    pub needs_human: bool,
    /// Agent holding the conversation after the turn.
    pub assigned_agent: Option<AgentId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Duplicate,
    TenantNotFound,
    Processed(TurnSummary),
    /// Storage failed before a conversation existed; the fallback reply was attempted.
    Failed(String),
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::TenantNotFound => "tenant_not_found",
            Self::Processed(_) => "processed",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Applied,
    /// The status would have moved backwards.
    Ignored,
    UnknownMessage,
    Failed,
}

impl StatusOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Ignored => "ignored",
            Self::UnknownMessage => "unknown_message",
            Self::Failed => "failed",
        }
    }
}

/// What the turn decided before any write.
struct Plan {
    reply: String,
    handled_by: HandledBy,
    intent: Option<Intent>,
    confidence: Option<f64>,
    tier: Option<Tier>,
    /// `None` leaves the stored flow untouched.
    flow: Option<Option<FlowSnapshot>>,
    side_effects: Vec<SideEffect>,
    needs_human: bool,
    escalation_reason: Option<String>,
    calls: Vec<(CostFeature, TierCall)>,
}

impl Plan {
    fn from_flow(
        turn: FlowTurn,
        decision: Option<&RoutingDecision>,
        calls: Vec<(CostFeature, TierCall)>,
    ) -> Self {
        let flow = Some(turn.snapshot().cloned());
        Self {
            reply: turn.reply,
            handled_by: HandledBy::Flow(turn.kind),
            intent: decision.map(|d| d.intent),
            confidence: decision.map(|d| d.confidence),
            tier: decision.map(|d| d.tier),
            flow,
            side_effects: turn.side_effects,
            needs_human: false,
            escalation_reason: None,
            calls,
        }
    }
}

/// Results of applying a plan's side effects.
#[derive(Default)]
struct Applied {
    reply_override: Option<String>,
    needs_human: bool,
    escalation_reason: Option<String>,
    lead_score: Option<i64>,
    lead_status: Option<String>,
}

impl Applied {
    fn hand_off(&mut self, reply: &str, reason: impl Into<String>) {
        self.reply_override = Some(reply.to_string());
        self.needs_human = true;
        self.escalation_reason.get_or_insert_with(|| reason.into());
    }
}

fn lead_score(email: Option<&str>, interest: Option<&str>) -> i64 {
    40 + if email.is_some() { 30 } else { 0 } + if interest.is_some() { 30 } else { 0 }
}

pub struct Pipeline {
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<dyn ChannelAdapter>,
    guard: IdempotencyGuard,
    tenants: TenantResolver,
    router: IntentRouter,
    flows: FlowExecutor,
    responder: Responder,
    assignment: AssignmentEngine,
    notifier: Notifier,
    locks: ConversationLocks,
    costs: Option<CostLedger>,
    pricing: TierPricing,
    db_timeout: Duration,
    history_limit: usize,
    fallback_reply: String,
}

impl Pipeline {
    /// Wire every stage from configuration. Fails if the flow registry is
    /// incomplete.
    pub fn new(
        config: &PalaverConfig,
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        costs: Option<CostLedger>,
    ) -> Result<Self, PalaverError> {
        let ladder = ModelLadder::from_config(provider, &config.routing);
        let flows = FlowExecutor::new(FlowRegistry::with_builtin_flows(), &config.flow)?
            .with_handoff_reply(config.pipeline.handoff_reply.clone());
        Ok(Self {
            guard: IdempotencyGuard::from_config(&config.cache),
            tenants: TenantResolver::from_config(storage.clone(), &config.cache),
            router: IntentRouter::new(ladder.clone(), &config.routing),
            flows,
            responder: Responder::new(
                ladder,
                config.routing.response_max_tokens,
                config.pipeline.fallback_reply.clone(),
            ),
            assignment: AssignmentEngine::new(storage.clone()),
            notifier: Notifier::new(storage.clone()),
            locks: ConversationLocks::new(),
            costs: if config.cost.track_tokens { costs } else { None },
            pricing: TierPricing::from_config(&config.cost),
            db_timeout: Duration::from_millis(config.pipeline.db_timeout_ms),
            history_limit: config.pipeline.history_limit,
            fallback_reply: config.pipeline.fallback_reply.clone(),
            storage,
            channel,
        })
    }

    pub fn tenants(&self) -> &TenantResolver {
        &self.tenants
    }

    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    pub fn assignment(&self) -> &AssignmentEngine {
        &self.assignment
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    /// Process one inbound event to completion.
    pub async fn handle_inbound(&self, event: InboundEvent) -> PipelineOutcome {
        let started = Instant::now();
        let outcome = self.process(&event).await;
        record_inbound(outcome.label());
        if matches!(outcome, PipelineOutcome::Processed(_)) {
            record_turn_latency(started.elapsed().as_secs_f64());
        }
        outcome
    }

    /// Apply a delivery-status callback to the outbound message it refers to.
    pub async fn handle_status(&self, callback: StatusCallback) -> StatusOutcome {
        let sid = callback.provider_message_id.as_str();
        let outcome = match self
            .db(self.storage.update_delivery_status(sid, callback.status))
            .await
        {
            Ok(StatusUpdate::Applied) => {
                debug!(provider_message_id = %sid, status = %callback.status, "delivery status applied");
                StatusOutcome::Applied
            }
            Ok(StatusUpdate::Ignored) => {
                debug!(provider_message_id = %sid, status = %callback.status, "out-of-order delivery status ignored");
                StatusOutcome::Ignored
            }
            Ok(StatusUpdate::UnknownMessage) => {
                warn!(provider_message_id = %sid, status = %callback.status, "status_for_unknown_message");
                StatusOutcome::UnknownMessage
            }
            Err(e) => {
                error!(provider_message_id = %sid, error = %e, "failed to apply delivery status");
                StatusOutcome::Failed
            }
        };
        if callback.status == DeliveryStatus::Failed {
            warn!(
                provider_message_id = %sid,
                error_code = callback.error_code.as_deref().unwrap_or("none"),
                "outbound message reported failed"
            );
        }
        record_status_callback(outcome.as_str());
        outcome
    }

    async fn process(&self, event: &InboundEvent) -> PipelineOutcome {
        let sid = event.provider_message_id.as_str();
        if !self.guard.check_and_mark(sid) {
            info!(provider_message_id = %sid, "duplicate_webhook");
            return PipelineOutcome::Duplicate;
        }

        let tenant = match self.db(self.tenants.resolve(&event.to)).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                warn!(provider_message_id = %sid, to = %event.to, "tenant_not_found");
                return PipelineOutcome::TenantNotFound;
            }
            Err(e) => {
                error!(provider_message_id = %sid, error = %e, "tenant resolution failed");
                self.send_fallback(&normalize_phone(&event.to), &event.from)
                    .await;
                return PipelineOutcome::Failed(e.to_string());
            }
        };
        let tenant_number = tenant
            .whatsapp_number
            .clone()
            .unwrap_or_else(|| normalize_phone(&event.to));

        let lock = self.locks.acquire(&tenant.id, &event.from).await;

        let conversation = match self
            .db(self.storage.upsert_conversation(
                &tenant.id,
                &event.from,
                event.profile_name.as_deref(),
                Actor::Pipeline,
            ))
            .await
        {
            Ok(conversation) => conversation,
            Err(e) => {
                error!(tenant_id = %tenant.id, provider_message_id = %sid, error = %e, "conversation upsert failed");
                drop(lock);
                self.send_fallback(&tenant_number, &event.from).await;
                return PipelineOutcome::Failed(e.to_string());
            }
        };

        let history = self.history(&conversation.id).await;
        let now = Utc::now();
        let plan = self
            .plan_turn(&tenant, &conversation, event, &history, now)
            .await;

        let inbound = NewMessage {
            conversation_id: conversation.id.clone(),
            direction: Direction::Inbound,
            content: event.body.clone(),
            provider_message_id: Some(sid.to_string()),
            intent: plan.intent,
            confidence: plan.confidence,
            tier: plan.tier,
            status: DeliveryStatus::Delivered,
        };
        match self.db(self.storage.insert_message(inbound)).await {
            Ok(InsertOutcome::Inserted(_)) => {}
            Ok(InsertOutcome::Duplicate) => {
                info!(
                    provider_message_id = %sid,
                    conversation_id = %conversation.id,
                    "duplicate_webhook: message already stored"
                );
                drop(lock);
                self.record_calls(&tenant.id, &conversation.id, &plan.calls)
                    .await;
                return PipelineOutcome::Duplicate;
            }
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "failed to persist inbound message, replying anyway");
            }
        }

        let applied = self
            .apply_side_effects(&tenant, &conversation, &plan.side_effects)
            .await;
        let reply = applied.reply_override.clone().unwrap_or(plan.reply);
        let needs_human = plan.needs_human || applied.needs_human;

        if needs_human && !conversation.needs_human {
            let reason = plan
                .escalation_reason
                .or(applied.escalation_reason)
                .unwrap_or_else(|| "handed over to a human".to_string());
            info!(tenant_id = %tenant.id, conversation_id = %conversation.id, reason = %reason, "conversation escalated");
            self.notifier
                .emit(
                    &tenant.id,
                    NotificationPayload::Escalation {
                        conversation_id: conversation.id.clone(),
                        customer_phone: conversation.customer_phone.clone(),
                        reason,
                    },
                )
                .await;
        }

        let outbound_id = self
            .persist_outbound(&conversation.id, &reply, plan.tier)
            .await;

        let update = ConversationUpdate {
            status: (needs_human && conversation.status != ConversationStatus::Escalated)
                .then_some(ConversationStatus::Escalated),
            flow: plan.flow,
            needs_human: (needs_human && !conversation.needs_human).then_some(true),
            lead_score: applied.lead_score,
            lead_status: applied.lead_status,
            last_message_at: Some(format_timestamp(now)),
        };
        let actor = match plan.handled_by {
            HandledBy::Flow(_) => Actor::Flow,
            _ => Actor::Pipeline,
        };
        if let Err(e) = self
            .db(self
                .storage
                .update_conversation(&conversation.id, update, actor))
            .await
        {
            error!(conversation_id = %conversation.id, error = %e, "failed to update conversation");
        }
        drop(lock);

        let sent = self
            .deliver(&tenant_number, &event.from, &reply, outbound_id.as_ref())
            .await;

        let assigned_agent = match &conversation.assigned_agent_id {
            Some(agent) => Some(agent.clone()),
            None if tenant.auto_assign_enabled() => {
                match self.assignment.auto_assign(&tenant, &conversation.id).await {
                    Ok(result) => result.agent_id,
                    Err(e) => {
                        warn!(conversation_id = %conversation.id, error = %e, "auto-assignment failed");
                        None
                    }
                }
            }
            None => None,
        };

        self.record_calls(&tenant.id, &conversation.id, &plan.calls)
            .await;

        info!(
            tenant_id = %tenant.id,
            conversation_id = %conversation.id,
            provider_message_id = %sid,
            handled_by = ?plan.handled_by,
            intent = ?plan.intent,
            tier = ?plan.tier,
            sent,
            needs_human,
            "inbound message processed"
        );

        PipelineOutcome::Processed(TurnSummary {
            conversation_id: conversation.id,
            reply,
            handled_by: plan.handled_by,
            intent: plan.intent,
            tier: plan.tier,
            sent,
            needs_human,
            assigned_agent,
        })
    }

    /// Decide the reply: active flow, else route and then flow or respond.
    async fn plan_turn(
        &self,
        tenant: &Tenant,
        conversation: &Conversation,
        event: &InboundEvent,
        history: &[ProviderMessage],
        now: DateTime<Utc>,
    ) -> Plan {
        let mut flow_expired = false;
        if let Some(snapshot) = &conversation.flow {
            if self.flows.is_expired(snapshot, now) {
                info!(
                    conversation_id = %conversation.id,
                    flow = %snapshot.kind,
                    "flow expired, handling message normally"
                );
                flow_expired = true;
            } else {
                let ctx = self.flow_context(tenant, conversation, event, now).await;
                let turn = self.flows.handle(snapshot, &event.body, &ctx, now);
                return Plan::from_flow(turn, None, Vec::new());
            }
        }
        let cleared_flow = flow_expired.then_some(None);

        let route_ctx = RouteContext {
            tenant_name: tenant.name.clone(),
            services: tenant.services.clone(),
            faq_questions: tenant.faqs.iter().map(|f| f.question.clone()).collect(),
            history: history.to_vec(),
        };
        let decision = self.router.route(&event.body, &route_ctx).await;
        let mut calls: Vec<(CostFeature, TierCall)> = decision
            .calls
            .iter()
            .cloned()
            .map(|call| (CostFeature::Classification, call))
            .collect();

        if decision.provider_unavailable {
            error!(
                tenant_id = %tenant.id,
                conversation_id = %conversation.id,
                heuristic_intent = %decision.intent,
                "provider_unavailable: every model call failed, sending fallback reply"
            );
            record_provider_unavailable();
            return Plan {
                reply: self.fallback_reply.clone(),
                handled_by: HandledBy::Fallback,
                intent: Some(decision.intent),
                confidence: Some(decision.confidence),
                tier: None,
                flow: cleared_flow,
                side_effects: Vec::new(),
                needs_human: true,
                escalation_reason: Some("AI provider unavailable".to_string()),
                calls,
            };
        }

        if let Some(kind) = decision.intent.flow() {
            let ctx = self.flow_context(tenant, conversation, event, now).await;
            let turn = self.flows.start(kind, &event.body, &ctx, now);
            return Plan::from_flow(turn, Some(&decision), calls);
        }

        let escalation_reason = (decision.intent == Intent::Escalate)
            .then(|| "customer asked for a human".to_string());
        let tier = if escalation_reason.is_some() {
            Tier::Premium
        } else {
            decision.tier
        };
        let response = self
            .responder
            .generate(&event.body, tenant, history, tier)
            .await;
        calls.extend(
            response
                .calls
                .into_iter()
                .map(|call| (CostFeature::Response, call)),
        );

        let handled_by = if response.faq_hit {
            HandledBy::FaqAnswer
        } else if response.served_by.is_none() {
            HandledBy::Fallback
        } else {
            HandledBy::Responder
        };
        Plan {
            reply: response.reply,
            handled_by,
            intent: Some(decision.intent),
            confidence: Some(decision.confidence),
            tier: Some(decision.tier),
            flow: cleared_flow,
            side_effects: Vec::new(),
            needs_human: escalation_reason.is_some() || response.needs_human,
            escalation_reason: escalation_reason.or_else(|| {
                response
                    .needs_human
                    .then(|| "assistant could not answer".to_string())
            }),
            calls,
        }
    }

    async fn flow_context(
        &self,
        tenant: &Tenant,
        conversation: &Conversation,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> FlowContext {
        let today = now.date_naive();
        let upcoming_booking = match self
            .db(self.storage.upcoming_booking(
                &tenant.id,
                &conversation.customer_phone,
                &today.format("%Y-%m-%d").to_string(),
            ))
            .await
        {
            Ok(booking) => booking,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "could not load upcoming booking");
                None
            }
        };
        FlowContext {
            today,
            services: tenant.services.clone(),
            upcoming_booking,
            customer_name: conversation
                .customer_name
                .clone()
                .or_else(|| event.profile_name.clone()),
        }
    }

    async fn apply_side_effects(
        &self,
        tenant: &Tenant,
        conversation: &Conversation,
        effects: &[SideEffect],
    ) -> Applied {
        let mut applied = Applied::default();
        for effect in effects {
            match effect {
                SideEffect::CreateBooking {
                    service,
                    date,
                    time,
                } => {
                    let result = self
                        .db(self.storage.create_booking(self.new_booking(
                            tenant, conversation, service, date, time,
                        )))
                        .await;
                    self.booking_written(
                        tenant,
                        result,
                        date,
                        time,
                        NotificationPayload::NewBooking,
                        &mut applied,
                    )
                    .await;
                }
                SideEffect::RescheduleBooking {
                    booking_id,
                    service,
                    date,
                    time,
                } => {
                    let moved = self
                        .db(self.storage.reschedule_booking(booking_id, date, time))
                        .await;
                    if matches!(moved, Ok(BookingOutcome::NotFound)) {
                        // The old booking is gone; hold the slot as a new booking.
                        let created = self
                            .db(self.storage.create_booking(self.new_booking(
                                tenant, conversation, service, date, time,
                            )))
                            .await;
                        self.booking_written(
                            tenant,
                            created,
                            date,
                            time,
                            NotificationPayload::NewBooking,
                            &mut applied,
                        )
                        .await;
                    } else {
                        self.booking_written(
                            tenant,
                            moved,
                            date,
                            time,
                            NotificationPayload::BookingUpdated,
                            &mut applied,
                        )
                        .await;
                    }
                }
                SideEffect::CancelBooking {
                    booking_id,
                    service,
                    date,
                    time,
                } => match self.db(self.storage.cancel_booking(booking_id)).await {
                    Ok(true) => {
                        let booking = BookingRef {
                            booking_id: booking_id.clone(),
                            conversation_id: Some(conversation.id.clone()),
                            customer_phone: conversation.customer_phone.clone(),
                            service: service.clone(),
                            date: date.clone(),
                            time: time.clone(),
                        };
                        self.notifier
                            .emit(&tenant.id, NotificationPayload::BookingCancelled(booking))
                            .await;
                    }
                    Ok(false) => applied.reply_override = Some(ALREADY_CANCELLED_REPLY.to_string()),
                    Err(e) => {
                        error!(booking_id = %booking_id, error = %e, "failed to cancel booking");
                        applied.hand_off(SAVE_FAILED_REPLY, "booking cancellation could not be saved");
                    }
                },
                SideEffect::CaptureLead {
                    name,
                    email,
                    interest,
                } => {
                    let lead = NewLead {
                        tenant_id: tenant.id.clone(),
                        conversation_id: conversation.id.clone(),
                        name: name.clone(),
                        email: email.clone(),
                        interest: interest.clone(),
                    };
                    match self.db(self.storage.insert_lead(lead)).await {
                        Ok(()) => {
                            applied.lead_status = Some("new".to_string());
                            applied.lead_score =
                                Some(lead_score(email.as_deref(), interest.as_deref()));
                            self.notifier
                                .emit(
                                    &tenant.id,
                                    NotificationPayload::NewLead {
                                        conversation_id: conversation.id.clone(),
                                        name: name.clone(),
                                        email: email.clone(),
                                        interest: interest.clone(),
                                    },
                                )
                                .await;
                        }
                        Err(e) => {
                            error!(conversation_id = %conversation.id, error = %e, "failed to store lead");
                            applied.needs_human = true;
                            applied
                                .escalation_reason
                                .get_or_insert_with(|| format!("lead from {name} could not be saved"));
                        }
                    }
                }
                SideEffect::FlagForHuman { reason } => {
                    applied.needs_human = true;
                    applied.escalation_reason.get_or_insert_with(|| reason.clone());
                }
            }
        }
        applied
    }

    fn new_booking(
        &self,
        tenant: &Tenant,
        conversation: &Conversation,
        service: &str,
        date: &str,
        time: &str,
    ) -> NewBooking {
        NewBooking {
            tenant_id: tenant.id.clone(),
            conversation_id: Some(conversation.id.clone()),
            customer_phone: conversation.customer_phone.clone(),
            service: service.to_string(),
            date: date.to_string(),
            time: time.to_string(),
        }
    }

    async fn booking_written(
        &self,
        tenant: &Tenant,
        result: Result<BookingOutcome, PalaverError>,
        date: &str,
        time: &str,
        notification: fn(BookingRef) -> NotificationPayload,
        applied: &mut Applied,
    ) {
        match result {
            Ok(BookingOutcome::Booked(booking)) => {
                self.notifier
                    .emit(&tenant.id, notification(BookingRef::from(&booking)))
                    .await;
            }
            Ok(BookingOutcome::SlotTaken) => {
                info!(tenant_id = %tenant.id, date, time, "booking slot already taken");
                applied.reply_override = Some(format!(
                    "Sorry, {date} at {time} has just been taken. Send \"book\" to choose another time."
                ));
            }
            Ok(BookingOutcome::NotFound) => {
                applied.hand_off(BOOKING_GONE_REPLY, "booking to update no longer exists");
            }
            Err(e) => {
                error!(tenant_id = %tenant.id, error = %e, "failed to save booking");
                applied.hand_off(SAVE_FAILED_REPLY, "booking could not be saved");
            }
        }
    }

    async fn history(&self, conversation_id: &ConversationId) -> Vec<ProviderMessage> {
        match self
            .db(self
                .storage
                .recent_messages(conversation_id, self.history_limit))
            .await
        {
            Ok(messages) => messages
                .into_iter()
                .map(|m| ProviderMessage {
                    role: match m.direction {
                        Direction::Inbound => "user".to_string(),
                        Direction::Outbound => "assistant".to_string(),
                    },
                    content: m.content,
                })
                .collect(),
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "could not load history");
                Vec::new()
            }
        }
    }

    async fn persist_outbound(
        &self,
        conversation_id: &ConversationId,
        reply: &str,
        tier: Option<Tier>,
    ) -> Option<MessageId> {
        let outbound = NewMessage {
            conversation_id: conversation_id.clone(),
            direction: Direction::Outbound,
            content: reply.to_string(),
            provider_message_id: None,
            intent: None,
            confidence: None,
            tier,
            status: DeliveryStatus::Queued,
        };
        match self.db(self.storage.insert_message(outbound)).await {
            Ok(InsertOutcome::Inserted(message)) => Some(message.id),
            Ok(InsertOutcome::Duplicate) => None,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "failed to persist outbound message");
                None
            }
        }
    }

    /// Send the reply and record the result on the stored message.
    async fn deliver(
        &self,
        from: &str,
        to: &str,
        body: &str,
        message_id: Option<&MessageId>,
    ) -> bool {
        let result = self
            .channel
            .send(OutboundMessage {
                from: from.to_string(),
                to: to.to_string(),
                body: body.to_string(),
            })
            .await;
        let (sent, provider_id, status) = match result {
            Ok(provider_id) => (true, Some(provider_id), DeliveryStatus::Sent),
            Err(e) => {
                error!(to = %to, error = %e, "reply send failed");
                (false, None, DeliveryStatus::Failed)
            }
        };
        if let Some(id) = message_id {
            if let Err(e) = self
                .db(self
                    .storage
                    .mark_outbound_result(id, provider_id.as_deref(), status))
                .await
            {
                warn!(message_id = %id, error = %e, "failed to record send result");
            }
        }
        sent
    }

    async fn send_fallback(&self, from: &str, to: &str) {
        self.deliver(from, to, &self.fallback_reply, None).await;
    }

    async fn record_calls(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        calls: &[(CostFeature, TierCall)],
    ) {
        for (feature, call) in calls {
            record_tier_call(
                &call.requested.to_string(),
                &call.served_by.to_string(),
                call.outcome.as_str(),
            );
            let usage = call.usage;
            if usage.input_tokens == 0 && usage.output_tokens == 0 {
                continue;
            }
            record_tokens(
                &call.served_by.to_string(),
                usage.input_tokens,
                usage.output_tokens,
            );
            let Some(ledger) = &self.costs else {
                continue;
            };
            let record = CostRecord::new(
                tenant_id.clone(),
                Some(conversation_id.clone()),
                call.served_by,
                call.model.clone(),
                *feature,
                &usage,
                self.pricing.cost(call.served_by, &usage),
            );
            if let Err(e) = ledger.record(&record).await {
                warn!(tenant_id = %tenant_id, error = %e, "failed to record AI cost");
            }
        }
    }

    async fn db<T, F>(&self, operation: F) -> Result<T, PalaverError>
    where
        F: Future<Output = Result<T, PalaverError>>,
    {
        match tokio::time::timeout(self.db_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(PalaverError::Timeout {
                duration: self.db_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use palaver_core::{AssignmentStrategy, NotificationKind};
    use tracing_test::traced_test;

    use crate::test_support::{
        FAST, PREMIUM, RecordingChannel, STANDARD, ScriptedProvider, TestStore, agent,
        classification, tenant,
    };

    const TENANT_NUMBER: &str = "15550001111";
    const CUSTOMER: &str = "33600000001";

    struct Fixture {
        store: TestStore,
        provider: Arc<ScriptedProvider>,
        channel: Arc<RecordingChannel>,
        pipeline: Pipeline,
    }

    async fn fixture() -> Fixture {
        let store = TestStore::new().await;
        let mut t = tenant("t1", TENANT_NUMBER);
        t.assignment_strategy = AssignmentStrategy::LeastBusy;
        store.seed_tenant(&t).await;

        let mut config = PalaverConfig::default();
        config.routing.fast_model = FAST.into();
        config.routing.standard_model = STANDARD.into();
        config.routing.premium_model = PREMIUM.into();

        let provider = Arc::new(ScriptedProvider::default());
        let channel = Arc::new(RecordingChannel::default());
        let pipeline = Pipeline::new(
            &config,
            store.storage(),
            channel.clone(),
            provider.clone(),
            None,
        )
        .unwrap();
        Fixture {
            store,
            provider,
            channel,
            pipeline,
        }
    }

    fn event(sid: &str, body: &str) -> InboundEvent {
        InboundEvent {
            provider_message_id: sid.into(),
            from: CUSTOMER.into(),
            to: TENANT_NUMBER.into(),
            body: body.into(),
            profile_name: Some("Jane".into()),
            media: Vec::new(),
            received_at: "2026-03-04T10:00:00.000Z".into(),
        }
    }

    fn processed(outcome: PipelineOutcome) -> TurnSummary {
        match outcome {
            PipelineOutcome::Processed(summary) => summary,
            other => panic!("expected processed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn greeting_is_answered_and_persisted() {
        let f = fixture().await;
        f.provider
            .reply(FAST, classification("GREETING", 0.95))
            .reply(FAST, "Hello Jane! How can I help?");

        let summary = processed(f.pipeline.handle_inbound(event("SM1", "Hello there")).await);
        assert_eq!(summary.handled_by, HandledBy::Responder);
        assert_eq!(summary.intent, Some(Intent::Greeting));
        assert!(summary.sent);
        assert_eq!(f.channel.bodies(), ["Hello Jane! How can I help?"]);

        let sent = f.channel.sent.lock().unwrap()[0].clone();
        assert_eq!(sent.from, TENANT_NUMBER);
        assert_eq!(sent.to, CUSTOMER);

        let messages = f
            .store
            .storage()
            .recent_messages(&summary.conversation_id, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].intent, Some(Intent::Greeting));
        assert_eq!(messages[0].tier, Some(Tier::Fast));
        assert_eq!(messages[1].status, DeliveryStatus::Sent);
        assert_eq!(messages[1].provider_message_id.as_deref(), Some("SMOUT1"));
    }

    #[tokio::test]
    #[traced_test]
    async fn duplicate_and_unknown_destination() {
        let f = fixture().await;
        f.provider
            .reply(FAST, classification("GREETING", 0.95))
            .reply(FAST, "Hi!");

        processed(f.pipeline.handle_inbound(event("SM123", "Hi")).await);
        assert_eq!(
            f.pipeline.handle_inbound(event("SM123", "Hi")).await,
            PipelineOutcome::Duplicate
        );
        assert_eq!(f.channel.bodies().len(), 1);

        let mut stray = event("SM124", "Hi");
        stray.to = "15559999999".into();
        assert_eq!(
            f.pipeline.handle_inbound(stray).await,
            PipelineOutcome::TenantNotFound
        );
        assert_eq!(f.channel.bodies().len(), 1);
        assert!(logs_contain("duplicate_webhook"));
        assert!(logs_contain("tenant_not_found"));
    }

    #[tokio::test]
    #[traced_test]
    async fn provider_outage_sends_fallback_and_flags_human() {
        let f = fixture().await;
        let summary = processed(f.pipeline.handle_inbound(event("SM1", "what's the price?")).await);
        assert_eq!(summary.handled_by, HandledBy::Fallback);
        assert_eq!(summary.reply, PalaverConfig::default().pipeline.fallback_reply);
        assert!(summary.sent);
        assert!(summary.needs_human);
        assert_eq!(f.provider.models_called(), [FAST]);
        assert!(logs_contain("provider_unavailable"));

        let conversation = f
            .store
            .storage()
            .get_conversation(&summary.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conversation.needs_human);
        assert_eq!(conversation.status, ConversationStatus::Escalated);

        let escalations: Vec<_> = f
            .store
            .storage()
            .list_notifications(&TenantId::new("t1"))
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.kind == NotificationKind::Escalation)
            .collect();
        assert_eq!(escalations.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn unparseable_classification_still_starts_the_flow() {
        let f = fixture().await;
        f.provider
            .reply(FAST, "Sure! This looks like a booking request.")
            .reply(STANDARD, classification("BOOKING", 0.9));

        let summary = processed(
            f.pipeline
                .handle_inbound(event("SM1", "Can I book a haircut tomorrow?"))
                .await,
        );
        assert_eq!(summary.handled_by, HandledBy::Flow(FlowKind::Booking));
        assert_eq!(summary.intent, Some(Intent::Booking));
        assert!(!summary.needs_human);
        assert_ne!(summary.reply, PalaverConfig::default().pipeline.fallback_reply);
        assert_eq!(f.provider.models_called(), [FAST, STANDARD]);
        assert!(!logs_contain("provider_unavailable"));
    }

    #[tokio::test]
    async fn active_flow_takes_every_turn_until_done() {
        let f = fixture().await;
        f.provider
            .reply(FAST, classification("BOOKING", 0.9))
            .reply(STANDARD, classification("BOOKING", 0.9));

        let first = processed(
            f.pipeline
                .handle_inbound(event("SM1", "Can I book a haircut tomorrow?"))
                .await,
        );
        assert_eq!(first.handled_by, HandledBy::Flow(FlowKind::Booking));
        assert_eq!(first.tier, Some(Tier::Standard));

        // No more scripted replies: any classification attempt would fall
        // back instead of reaching the flow.
        let second = processed(f.pipeline.handle_inbound(event("SM2", "3pm")).await);
        assert_eq!(second.handled_by, HandledBy::Flow(FlowKind::Booking));
        let third = processed(f.pipeline.handle_inbound(event("SM3", "yes")).await);
        assert_eq!(third.handled_by, HandledBy::Flow(FlowKind::Booking));
        assert!(third.reply.starts_with("You're booked: Haircut"));
        assert_eq!(f.provider.models_called(), [FAST, STANDARD]);

        let conversation = f
            .store
            .storage()
            .get_conversation(&third.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conversation.flow.is_none());

        let notes = f
            .store
            .storage()
            .list_notifications(&TenantId::new("t1"))
            .await
            .unwrap();
        assert!(notes.iter().any(|n| n.kind == NotificationKind::NewBooking));
    }

    #[tokio::test]
    async fn taken_slot_overrides_the_confirmation() {
        let f = fixture().await;
        let tomorrow = (Utc::now().date_naive() + chrono::Days::new(1))
            .format("%Y-%m-%d")
            .to_string();
        f.store
            .storage()
            .create_booking(NewBooking {
                tenant_id: TenantId::new("t1"),
                conversation_id: None,
                customer_phone: "33600000999".into(),
                service: "Haircut".into(),
                date: tomorrow.clone(),
                time: "15:00".into(),
            })
            .await
            .unwrap();
        f.provider
            .reply(FAST, classification("BOOKING", 0.9))
            .reply(STANDARD, classification("BOOKING", 0.9));

        processed(f.pipeline.handle_inbound(event("SM1", "book a haircut tomorrow")).await);
        processed(f.pipeline.handle_inbound(event("SM2", "15:00")).await);
        let last = processed(f.pipeline.handle_inbound(event("SM3", "yes")).await);
        assert_eq!(
            last.reply,
            format!("Sorry, {tomorrow} at 15:00 has just been taken. Send \"book\" to choose another time.")
        );
    }

    #[tokio::test]
    async fn escalation_flags_notifies_and_assigns() {
        let f = fixture().await;
        f.store.seed_agent(&agent("a1", "t1", 3)).await;
        f.provider
            .reply(FAST, classification("ESCALATE", 0.9))
            .reply(PREMIUM, classification("ESCALATE", 0.95))
            .reply(PREMIUM, "Of course, a colleague will take over.");

        let summary = processed(
            f.pipeline
                .handle_inbound(event("SM1", "I want to speak to a person"))
                .await,
        );
        assert!(summary.needs_human);
        assert_eq!(summary.tier, Some(Tier::Premium));
        assert_eq!(summary.assigned_agent, Some(AgentId::new("a1")));

        let conversation = f
            .store
            .storage()
            .get_conversation(&summary.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.status, ConversationStatus::Escalated);
        assert!(conversation.needs_human);

        let notes = f
            .store
            .storage()
            .list_notifications(&TenantId::new("t1"))
            .await
            .unwrap();
        assert_eq!(
            notes
                .iter()
                .filter(|n| n.kind == NotificationKind::Escalation)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_send_is_recorded() {
        let f = fixture().await;
        f.channel.failing.store(true, Ordering::SeqCst);
        f.provider
            .reply(FAST, classification("GREETING", 0.95))
            .reply(FAST, "Hi!");

        let summary = processed(f.pipeline.handle_inbound(event("SM1", "Hi")).await);
        assert!(!summary.sent);
        let messages = f
            .store
            .storage()
            .recent_messages(&summary.conversation_id, 10)
            .await
            .unwrap();
        assert_eq!(messages[1].status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn status_callbacks() {
        let f = fixture().await;
        f.provider
            .reply(FAST, classification("GREETING", 0.95))
            .reply(FAST, "Hi!");
        processed(f.pipeline.handle_inbound(event("SM1", "Hi")).await);

        let callback = |sid: &str, status| StatusCallback {
            provider_message_id: sid.into(),
            status,
            error_code: None,
        };
        assert_eq!(
            f.pipeline
                .handle_status(callback("SMOUT1", DeliveryStatus::Delivered))
                .await,
            StatusOutcome::Applied
        );
        assert_eq!(
            f.pipeline
                .handle_status(callback("SMOUT1", DeliveryStatus::Sent))
                .await,
            StatusOutcome::Ignored
        );
        assert_eq!(
            f.pipeline
                .handle_status(callback("SMNOPE", DeliveryStatus::Read))
                .await,
            StatusOutcome::UnknownMessage
        );
    }
}
