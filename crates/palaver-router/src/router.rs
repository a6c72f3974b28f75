// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost-aware intent routing across three model tiers.
//!
//! Every message is classified by the fast model first. It escalates to the
//! standard model for intents that need structured follow-up or when the fast
//! model is unsure, and to the premium model on an explicit escalation or when
//! the standard model is still unsure. Failed calls degrade down the ladder.
//! A fast-model reply that cannot be parsed is replaced by the keyword
//! heuristic and routing carries on; only when the fast model is unreachable
//! does the router report the provider as unavailable.

use std::str::FromStr;

use palaver_config::model::RoutingConfig;
use palaver_core::{Intent, ProviderMessage, Tier};
use tracing::{debug, info, warn};

use crate::heuristic::HeuristicClassifier;
use crate::ladder::{CallOutcome, ModelLadder, TierCall};
use crate::prompt::{Classification, classification_request, parse_classification};

/// Tenant and conversation context for classification.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub tenant_name: String,
    pub services: Vec<String>,
    pub faq_questions: Vec<String>,
    /// Recent turns, oldest first.
    pub history: Vec<ProviderMessage>,
}

/// The outcome of routing one inbound message.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub intent: Intent,
    pub confidence: f64,
    /// Highest tier the message escalated to. Replies are generated here.
    pub tier: Tier,
    /// Every model attempt, in order, for cost accounting.
    pub calls: Vec<TierCall>,
    /// A tier above the fast one failed and a cheaper result was kept.
    pub degraded: bool,
    /// The fast model could not be reached; `intent` came from heuristics.
    pub provider_unavailable: bool,
}

/// Three-tier intent router.
pub struct IntentRouter {
    ladder: ModelLadder,
    heuristic: HeuristicClassifier,
    tier1_threshold: f64,
    tier2_threshold: f64,
    structured_intents: Vec<Intent>,
    max_tokens: u32,
}

impl IntentRouter {
    pub fn new(ladder: ModelLadder, config: &RoutingConfig) -> Self {
        let structured_intents = config
            .structured_intents
            .iter()
            .filter_map(|s| Intent::from_str(s).ok())
            .collect();
        Self {
            ladder,
            heuristic: HeuristicClassifier::new(),
            tier1_threshold: config.tier1_confidence_threshold,
            tier2_threshold: config.tier2_confidence_threshold,
            structured_intents,
            max_tokens: config.classification_max_tokens,
        }
    }

    pub fn ladder(&self) -> &ModelLadder {
        &self.ladder
    }

    fn needs_structured_follow_up(&self, intent: Intent) -> bool {
        self.structured_intents.contains(&intent)
    }

    async fn classify_at(
        &self,
        tier: Tier,
        text: &str,
        ctx: &RouteContext,
        calls: &mut Vec<TierCall>,
    ) -> Option<(Classification, bool)> {
        let outcome = self
            .ladder
            .run(
                tier,
                |model| classification_request(model, text, ctx, self.max_tokens),
                |response| parse_classification(&response.content),
            )
            .await;
        let degraded = outcome.degraded(tier);
        calls.extend(outcome.calls);
        outcome.value.map(|c| (c, degraded))
    }

    /// Classify a message. Never fails: provider trouble shows up as
    /// `degraded` or `provider_unavailable` on the decision.
    pub async fn route(&self, text: &str, ctx: &RouteContext) -> RoutingDecision {
        let mut calls = Vec::new();

        let (first_intent, first_confidence, degraded) =
            match self.classify_at(Tier::Fast, text, ctx, &mut calls).await {
                Some((first, _)) => (first.intent, first.confidence, false),
                None => {
                    let guess = self.heuristic.classify(text);
                    let answered = calls.iter().any(|c| c.outcome == CallOutcome::Unusable);
                    if !answered {
                        warn!(
                            intent = %guess.intent,
                            reason = guess.reason,
                            "provider_unavailable: fast tier failed, using heuristic classification"
                        );
                        return RoutingDecision {
                            intent: guess.intent,
                            confidence: guess.confidence,
                            tier: Tier::Fast,
                            calls,
                            degraded: true,
                            provider_unavailable: true,
                        };
                    }
                    info!(
                        intent = %guess.intent,
                        reason = guess.reason,
                        "fast tier reply unparseable, using heuristic classification"
                    );
                    (guess.intent, guess.confidence, true)
                }
            };

        let mut decision = RoutingDecision {
            intent: first_intent,
            confidence: first_confidence,
            tier: Tier::Fast,
            calls: Vec::new(),
            degraded,
            provider_unavailable: false,
        };

        let escalate_to_premium = if first_intent == Intent::Escalate {
            true
        } else if self.needs_structured_follow_up(first_intent)
            || first_confidence < self.tier1_threshold
        {
            decision.tier = Tier::Standard;
            match self.classify_at(Tier::Standard, text, ctx, &mut calls).await {
                Some((second, degraded)) => {
                    decision.intent = second.intent;
                    decision.confidence = second.confidence;
                    decision.degraded |= degraded;
                    second.intent == Intent::Escalate || second.confidence < self.tier2_threshold
                }
                None => {
                    decision.degraded = true;
                    false
                }
            }
        } else {
            false
        };

        if escalate_to_premium {
            decision.tier = Tier::Premium;
            match self.classify_at(Tier::Premium, text, ctx, &mut calls).await {
                Some((third, degraded)) => {
                    decision.intent = third.intent;
                    decision.confidence = third.confidence;
                    decision.degraded |= degraded;
                }
                None => decision.degraded = true,
            }
        }

        if decision.degraded {
            info!(
                intent = %decision.intent,
                tier = %decision.tier,
                "routing degraded to a cheaper tier"
            );
        }
        debug!(
            intent = %decision.intent,
            confidence = decision.confidence,
            tier = %decision.tier,
            calls = calls.len(),
            "message routed"
        );
        decision.calls = calls;
        decision
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::ladder::test_provider::{Reply, ScriptedProvider};
    use crate::ladder::TierModels;

    fn config() -> RoutingConfig {
        RoutingConfig {
            fast_model: "fast".into(),
            standard_model: "standard".into(),
            premium_model: "premium".into(),
            tier1_confidence_threshold: 0.7,
            tier2_confidence_threshold: 0.5,
            ..RoutingConfig::default()
        }
    }

    fn router(provider: Arc<ScriptedProvider>) -> IntentRouter {
        let cfg = config();
        let ladder = ModelLadder::new(
            provider,
            TierModels::from_config(&cfg),
            Duration::from_millis(500),
        );
        IntentRouter::new(ladder, &cfg)
    }

    fn json(intent: &str, confidence: f64) -> String {
        format!(r#"{{"intent":"{intent}","confidence":{confidence}}}"#)
    }

    fn ctx() -> RouteContext {
        RouteContext {
            tenant_name: "Salon".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn confident_simple_intent_stays_on_fast() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text(json("GREETING", 0.95)));
        let d = router(provider.clone()).route("Bonjour", &ctx()).await;
        assert_eq!(d.intent, Intent::Greeting);
        assert_eq!(d.tier, Tier::Fast);
        assert!(!d.degraded && !d.provider_unavailable);
        assert_eq!(provider.models_called(), vec!["fast"]);
    }

    #[tokio::test]
    async fn structured_intent_escalates_to_standard() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text(json("BOOKING", 0.99)));
        provider.push("standard", Reply::Text(json("BOOKING", 0.9)));
        let d = router(provider.clone()).route("book me in", &ctx()).await;
        assert_eq!(d.intent, Intent::Booking);
        assert_eq!(d.tier, Tier::Standard);
        assert_eq!(provider.models_called(), vec!["fast", "standard"]);
    }

    #[tokio::test]
    async fn low_confidence_climbs_to_premium_after_standard() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text(json("GENERAL", 0.3)));
        provider.push("standard", Reply::Text(json("GENERAL", 0.4)));
        provider.push("premium", Reply::Text(json("FAQ", 0.8)));
        let d = router(provider.clone()).route("hmm", &ctx()).await;
        assert_eq!(d.intent, Intent::Faq);
        assert_eq!(d.tier, Tier::Premium);
        assert_eq!(provider.models_called(), vec!["fast", "standard", "premium"]);
    }

    #[tokio::test]
    async fn explicit_escalation_goes_straight_to_premium() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text(json("ESCALATE", 0.9)));
        provider.push("premium", Reply::Text(json("ESCALATE", 0.95)));
        let d = router(provider.clone()).route("I want a human", &ctx()).await;
        assert_eq!(d.intent, Intent::Escalate);
        assert_eq!(d.tier, Tier::Premium);
        assert_eq!(provider.models_called(), vec!["fast", "premium"]);
    }

    #[tokio::test]
    async fn failed_standard_keeps_fast_result() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text(json("BOOKING", 0.9)));
        provider.push("standard", Reply::Fail);
        provider.push("fast", Reply::Fail);
        let d = router(provider.clone()).route("book", &ctx()).await;
        assert_eq!(d.intent, Intent::Booking);
        assert!(d.degraded);
        assert!(!d.provider_unavailable);
        assert_eq!(provider.models_called(), vec!["fast", "standard", "fast"]);
    }

    #[tokio::test]
    async fn failed_premium_degrades_to_standard_model() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text(json("ESCALATE", 0.9)));
        provider.push("premium", Reply::Fail);
        provider.push("standard", Reply::Text(json("ESCALATE", 0.8)));
        let d = router(provider.clone()).route("complaint!", &ctx()).await;
        assert_eq!(d.intent, Intent::Escalate);
        assert_eq!(d.tier, Tier::Premium);
        assert!(d.degraded);
        let served: Vec<_> = d.calls.iter().map(|c| (c.requested, c.served_by)).collect();
        assert_eq!(
            served,
            vec![
                (Tier::Fast, Tier::Fast),
                (Tier::Premium, Tier::Premium),
                (Tier::Premium, Tier::Standard),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_provider_uses_heuristics() {
        let provider = Arc::new(ScriptedProvider::default());
        let d = router(provider.clone()).route("Je voudrais un rendez-vous", &ctx()).await;
        assert!(d.provider_unavailable);
        assert_eq!(d.intent, Intent::Booking);
        assert_eq!(d.calls.len(), 1);
        assert_eq!(d.calls[0].outcome, CallOutcome::Error);
    }

    #[tokio::test]
    async fn unparseable_fast_reply_uses_heuristic_and_keeps_routing() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text("Sure! This looks like a booking request.".into()));
        provider.push("standard", Reply::Text(json("BOOKING", 0.9)));
        let d = router(provider.clone()).route("Can I book a haircut?", &ctx()).await;
        assert!(!d.provider_unavailable);
        assert_eq!(d.intent, Intent::Booking);
        assert_eq!(d.tier, Tier::Standard);
        assert_eq!(d.calls[0].outcome, CallOutcome::Unusable);
        assert_eq!(provider.models_called(), vec!["fast", "standard"]);
    }

    #[tokio::test]
    async fn unparseable_fast_reply_then_outage_keeps_heuristic_intent() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push("fast", Reply::Text("no idea".into()));
        let d = router(provider.clone()).route("Je voudrais un rendez-vous", &ctx()).await;
        assert!(!d.provider_unavailable);
        assert!(d.degraded);
        assert_eq!(d.intent, Intent::Booking);
        assert_eq!(provider.models_called(), vec!["fast", "standard", "fast"]);
    }

    #[tokio::test]
    async fn tier_one_always_first() {
        for (intent, conf) in [("FAQ", 0.2), ("ESCALATE", 0.99), ("LEAD_CAPTURE", 0.8)] {
            let provider = Arc::new(ScriptedProvider::default());
            provider.push("fast", Reply::Text(json(intent, conf)));
            provider.push("standard", Reply::Text(json(intent, 0.9)));
            provider.push("premium", Reply::Text(json(intent, 0.9)));
            let d = router(provider.clone()).route("x", &ctx()).await;
            assert_eq!(d.calls[0].requested, Tier::Fast);
            let tiers: Vec<_> = d.calls.iter().map(|c| c.requested).collect();
            let mut sorted = tiers.clone();
            sorted.sort();
            assert_eq!(tiers, sorted, "requested tiers never go back down");
        }
    }
}
