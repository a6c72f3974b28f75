// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification prompt construction and reply parsing.

use std::str::FromStr;

use palaver_core::{Intent, ProviderMessage, ProviderRequest};
use serde::Deserialize;

use crate::router::RouteContext;

const INTENT_GUIDE: &str = "\
GREETING: hello, small talk with no request
FAQ: a question answerable from the business information or FAQs
BOOKING: wants to make or move an appointment
CANCELLATION: wants to cancel an existing appointment
LEAD_CAPTURE: interested in a service, asks for a quote or a callback
ESCALATE: asks for a human, is upset, or the request is complex or sensitive
GENERAL: anything else";

/// System prompt for intent classification.
pub fn classification_system_prompt(ctx: &RouteContext) -> String {
    let mut prompt = format!(
        "You classify WhatsApp messages sent to {}. Reply with JSON only: \
         {{\"intent\": \"<INTENT>\", \"confidence\": <0.0-1.0>}}.\n\nIntents:\n{INTENT_GUIDE}\n",
        ctx.tenant_name
    );
    if !ctx.services.is_empty() {
        prompt.push_str("\nServices offered: ");
        prompt.push_str(&ctx.services.join(", "));
        prompt.push('\n');
    }
    if !ctx.faq_questions.is_empty() {
        prompt.push_str("\nKnown FAQ questions:\n");
        for q in &ctx.faq_questions {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
    }
    prompt
}

/// Build a classification request for `model`.
pub fn classification_request(
    model: &str,
    text: &str,
    ctx: &RouteContext,
    max_tokens: u32,
) -> ProviderRequest {
    let mut messages: Vec<ProviderMessage> = ctx.history.clone();
    messages.push(ProviderMessage {
        role: "user".into(),
        content: text.to_string(),
    });
    ProviderRequest {
        model: model.to_string(),
        system_prompt: Some(classification_system_prompt(ctx)),
        messages,
        max_tokens,
    }
}

#[derive(Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// A parsed model classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// Clamped to 0.0-1.0.
    pub confidence: f64,
}

/// Parse a classification reply.
///
/// Models sometimes wrap the JSON in prose or code fences; the first `{` to
/// the last `}` is parsed. A missing confidence reads as 0.5. Unknown intents
/// and non-JSON replies return `None`.
pub fn parse_classification(reply: &str) -> Option<Classification> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawClassification = serde_json::from_str(&reply[start..=end]).ok()?;
    let intent = Intent::from_str(raw.intent.trim()).ok()?;
    let confidence = raw.confidence.unwrap_or(0.5);
    if !confidence.is_finite() {
        return None;
    }
    Some(Classification {
        intent,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RouteContext {
        RouteContext {
            tenant_name: "Salon Lumière".into(),
            services: vec!["Haircut".into(), "Coloring".into()],
            faq_questions: vec!["What are your hours?".into()],
            history: vec![ProviderMessage {
                role: "assistant".into(),
                content: "Hello!".into(),
            }],
        }
    }

    #[test]
    fn prompt_includes_tenant_context() {
        let prompt = classification_system_prompt(&ctx());
        assert!(prompt.contains("Salon Lumière"));
        assert!(prompt.contains("Haircut, Coloring"));
        assert!(prompt.contains("- What are your hours?"));
        assert!(prompt.contains("LEAD_CAPTURE"));
    }

    #[test]
    fn request_appends_message_after_history() {
        let req = classification_request("m", "book me in", &ctx(), 200);
        assert_eq!(req.model, "m");
        assert_eq!(req.max_tokens, 200);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].content, "book me in");
    }

    #[test]
    fn parses_plain_and_wrapped_json() {
        let c = parse_classification(r#"{"intent":"BOOKING","confidence":0.92}"#).unwrap();
        assert_eq!(c.intent, Intent::Booking);
        assert!((c.confidence - 0.92).abs() < 1e-9);

        let wrapped = "Sure:\n```json\n{\"intent\": \"lead_capture\", \"confidence\": 1.7}\n```";
        let c = parse_classification(wrapped).unwrap();
        assert_eq!(c.intent, Intent::LeadCapture);
        assert_eq!(c.confidence, 1.0);

        let c = parse_classification(r#"{"intent":"FAQ"}"#).unwrap();
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_classification("BOOKING").is_none());
        assert!(parse_classification(r#"{"intent":"DANCE","confidence":0.9}"#).is_none());
        assert!(parse_classification("} {").is_none());
    }
}
