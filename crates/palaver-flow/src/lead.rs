// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead capture: name, e-mail (optional), interest.

use palaver_core::FlowKind;
use serde::{Deserialize, Serialize};

use crate::definition::{FlowContext, FlowDefinition, SideEffect, Step, Transition};
use crate::parse::{is_skip, parse_email};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LeadState {
    CollectingName,
    CollectingEmail {
        name: String,
    },
    CollectingInterest {
        name: String,
        email: Option<String>,
    },
}

pub struct LeadCaptureFlow;

const ASK_EMAIL: &str = "What's the best e-mail address to reach you? (reply SKIP if you'd rather not say)";
const ASK_INTEREST: &str = "Thanks! What are you interested in? A few words are enough.";

fn clean_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();
    let name = ["my name is ", "i'm ", "i am ", "je m'appelle ", "c'est ", "moi c'est "]
        .iter()
        .find_map(|prefix| {
            lower
                .strip_prefix(prefix)
                .and_then(|_| trimmed.get(prefix.len()..))
        })
        .unwrap_or(trimmed)
        .trim()
        .trim_end_matches(['.', '!']);
    let valid = !name.is_empty()
        && name.chars().count() <= 80
        && name.chars().any(char::is_alphabetic)
        && !name.chars().any(|c| c.is_ascii_digit() || c == '@');
    valid.then(|| name.to_string())
}

impl LeadCaptureFlow {
    fn step(&self, state: LeadState, input: &str) -> Transition {
        match state {
            LeadState::CollectingName => match clean_name(input) {
                Some(name) => Transition::next(
                    &LeadState::CollectingEmail { name: name.clone() },
                    format!("Nice to meet you, {name}. {ASK_EMAIL}"),
                ),
                None => Transition::retry("Sorry, could you tell me your name?"),
            },
            LeadState::CollectingEmail { name } => {
                if is_skip(input) {
                    return Transition::next(
                        &LeadState::CollectingInterest { name, email: None },
                        ASK_INTEREST,
                    );
                }
                match parse_email(input) {
                    Some(email) => Transition::next(
                        &LeadState::CollectingInterest {
                            name,
                            email: Some(email),
                        },
                        ASK_INTEREST,
                    ),
                    None => Transition::retry(
                        "That doesn't look like an e-mail address. Please send it like name@example.com, or reply SKIP.",
                    ),
                }
            }
            LeadState::CollectingInterest { name, email } => {
                let interest = input.trim();
                if interest.is_empty() {
                    return Transition::retry("What are you interested in?");
                }
                let interest = (!is_skip(interest)).then(|| interest.to_string());
                Transition::completed(
                    format!("Thank you, {name}! Someone from our team will be in touch soon."),
                    vec![SideEffect::CaptureLead {
                        name,
                        email,
                        interest,
                    }],
                )
            }
        }
    }
}

impl FlowDefinition for LeadCaptureFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::LeadCapture
    }

    fn start(&self, _trigger: &str, ctx: &FlowContext) -> Transition {
        match ctx.customer_name.as_deref().and_then(clean_name) {
            Some(name) => Transition::next(
                &LeadState::CollectingEmail { name: name.clone() },
                format!("Happy to help, {name}! {ASK_EMAIL}"),
            ),
            None => Transition::next(
                &LeadState::CollectingName,
                "Happy to help! First, what's your name?",
            ),
        }
    }

    fn advance(&self, state: &serde_json::Value, input: &str, _ctx: &FlowContext) -> Transition {
        match serde_json::from_value::<LeadState>(state.clone()) {
            Ok(state) => self.step(state, input),
            Err(_) => Transition {
                step: Step::Abandoned,
                reply: "Sorry, something went wrong. A member of our team will follow up with you.".into(),
                side_effects: vec![SideEffect::FlagForHuman {
                    reason: "unreadable lead capture state".into(),
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ctx(name: Option<&str>) -> FlowContext {
        FlowContext {
            today: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            services: vec![],
            upcoming_booking: None,
            customer_name: name.map(str::to_string),
        }
    }

    #[test]
    fn profile_name_skips_the_name_question() {
        let t = LeadCaptureFlow.start("I'd like a quote", &ctx(Some("Jane")));
        assert_eq!(
            t.step,
            Step::Continue(json!({"step": "collecting_email", "name": "Jane"}))
        );
        let t = LeadCaptureFlow.start("I'd like a quote", &ctx(None));
        assert_eq!(t.step, Step::Continue(json!({"step": "collecting_name"})));
    }

    #[test]
    fn full_capture() {
        let flow = LeadCaptureFlow;
        let c = ctx(None);
        let t = flow.advance(&json!({"step": "collecting_name"}), "My name is Jean Dupont", &c);
        assert!(t.reply.contains("Jean Dupont"));
        let Step::Continue(s) = t.step else { panic!() };

        let t = flow.advance(&s, "jean@dupont.fr", &c);
        let Step::Continue(s) = t.step else { panic!() };

        let t = flow.advance(&s, "Wedding hair for 6 people", &c);
        assert_eq!(t.step, Step::Completed);
        assert_eq!(
            t.side_effects,
            vec![SideEffect::CaptureLead {
                name: "Jean Dupont".into(),
                email: Some("jean@dupont.fr".into()),
                interest: Some("Wedding hair for 6 people".into()),
            }]
        );
    }

    #[test]
    fn email_is_optional_but_validated() {
        let flow = LeadCaptureFlow;
        let c = ctx(None);
        let s = json!({"step": "collecting_email", "name": "Jane"});
        assert_eq!(flow.advance(&s, "jane at gmail", &c).step, Step::Retry);
        let t = flow.advance(&s, "skip", &c);
        assert_eq!(
            t.step,
            Step::Continue(json!({"step": "collecting_interest", "name": "Jane", "email": null}))
        );
    }

    #[test]
    fn names_must_look_like_names() {
        assert_eq!(clean_name("I'm Zoé."), Some("Zoé".into()));
        assert_eq!(clean_name("0612345678"), None);
        assert_eq!(clean_name("   "), None);
    }
}
