// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-text replies grounded in the tenant's FAQs and business info.
//!
//! The responder never touches flow state. At the fast tier a message that
//! clearly matches an FAQ is answered from the FAQ without a model call.

use std::collections::HashSet;

use palaver_core::{Faq, ProviderMessage, ProviderRequest, Tenant, Tier};
use palaver_router::{ModelLadder, TierCall};
use tracing::{debug, warn};

/// Models append this when they cannot answer from the given information.
const HANDOFF_MARKER: &str = "[HANDOFF]";

const FAQ_MIN_OVERLAP: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "the", "and", "are", "you", "your", "what", "when", "where", "how", "can", "for", "does",
    "have", "with", "this", "that", "there", "les", "des", "une", "est", "vous", "votre", "vos",
    "quel", "quels", "quelle", "quelles", "pour", "avec", "que", "qui", "est-ce",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ResponderOutcome {
    pub reply: String,
    /// The reply could not be grounded and a human should follow up.
    pub needs_human: bool,
    pub calls: Vec<TierCall>,
    /// Tier whose model wrote the reply; `None` for FAQ hits and fallbacks.
    pub served_by: Option<Tier>,
    pub faq_hit: bool,
}

pub struct Responder {
    ladder: ModelLadder,
    max_tokens: u32,
    fallback_reply: String,
}

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(w))
        .map(|w| {
            if w.len() > 4 {
                w.strip_suffix('s').unwrap_or(w).to_string()
            } else {
                w.to_string()
            }
        })
        .collect()
}

/// The FAQ whose question shares the largest share of keywords with the
/// message, if at least half of the question's keywords appear.
pub fn match_faq<'a>(message: &str, faqs: &'a [Faq]) -> Option<&'a Faq> {
    let words = keywords(message);
    if words.is_empty() {
        return None;
    }
    faqs.iter()
        .filter_map(|faq| {
            let question = keywords(&faq.question);
            if question.is_empty() {
                return None;
            }
            let shared = question.intersection(&words).count();
            let score = shared as f64 / question.len() as f64;
            (shared > 0 && score >= FAQ_MIN_OVERLAP).then_some((faq, score, shared))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)))
        .map(|(faq, _, _)| faq)
}

pub fn system_prompt(tenant: &Tenant) -> String {
    let mut prompt = format!(
        "You are the WhatsApp assistant of {}. Answer the customer briefly and politely, \
         in the language they write in, using only the information below. If the answer \
         is not in this information, say that a member of the team will follow up and end \
         your reply with {HANDOFF_MARKER}.\n",
        tenant.name
    );
    if let Some(info) = &tenant.business_info {
        prompt.push_str("\nAbout the business:\n");
        prompt.push_str(info);
        prompt.push('\n');
    }
    if !tenant.services.is_empty() {
        prompt.push_str("\nServices: ");
        prompt.push_str(&tenant.services.join(", "));
        prompt.push('\n');
    }
    if !tenant.faqs.is_empty() {
        prompt.push_str("\nFrequently asked questions:\n");
        for faq in &tenant.faqs {
            prompt.push_str(&format!("Q: {}\nA: {}\n", faq.question, faq.answer));
        }
    }
    prompt
}

impl Responder {
    pub fn new(ladder: ModelLadder, max_tokens: u32, fallback_reply: impl Into<String>) -> Self {
        Self {
            ladder,
            max_tokens,
            fallback_reply: fallback_reply.into(),
        }
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    /// Write a reply to `message` starting at `tier`.
    pub async fn generate(
        &self,
        message: &str,
        tenant: &Tenant,
        history: &[ProviderMessage],
        tier: Tier,
    ) -> ResponderOutcome {
        if tier == Tier::Fast {
            if let Some(faq) = match_faq(message, &tenant.faqs) {
                debug!(tenant_id = %tenant.id, question = %faq.question, "answered from FAQ");
                return ResponderOutcome {
                    reply: faq.answer.clone(),
                    needs_human: false,
                    calls: Vec::new(),
                    served_by: None,
                    faq_hit: true,
                };
            }
        }

        let system = system_prompt(tenant);
        let outcome = self
            .ladder
            .run(
                tier,
                |model| {
                    let mut messages = history.to_vec();
                    messages.push(ProviderMessage {
                        role: "user".into(),
                        content: message.to_string(),
                    });
                    ProviderRequest {
                        model: model.to_string(),
                        system_prompt: Some(system.clone()),
                        messages,
                        max_tokens: self.max_tokens,
                    }
                },
                |response| {
                    let text = response.content.trim();
                    (!text.is_empty()).then(|| text.to_string())
                },
            )
            .await;

        match outcome.value {
            Some(text) => {
                let needs_human = text.contains(HANDOFF_MARKER);
                let reply = text.replace(HANDOFF_MARKER, "").trim().to_string();
                ResponderOutcome {
                    reply: if reply.is_empty() {
                        self.fallback_reply.clone()
                    } else {
                        reply
                    },
                    needs_human,
                    calls: outcome.calls,
                    served_by: outcome.served_by,
                    faq_hit: false,
                }
            }
            None => {
                warn!(tenant_id = %tenant.id, tier = %tier, "no model could write a reply, sending fallback");
                ResponderOutcome {
                    reply: self.fallback_reply.clone(),
                    needs_human: true,
                    calls: outcome.calls,
                    served_by: None,
                    faq_hit: false,
                }
            }
        }
    }
}
