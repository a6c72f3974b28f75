// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic intent pre-classification.
//!
//! Keyword rules in English and French with zero cost and zero latency. Used
//! when every model call fails or returns something unusable, so the pipeline
//! still knows whether to start a flow or hand off to a human.

use palaver_core::Intent;

/// Result of classifying a message with keyword rules.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicResult {
    pub intent: Intent,
    /// Confidence in the classification (0.0-1.0).
    pub confidence: f64,
    /// Human-readable reason for the classification.
    pub reason: &'static str,
}

/// Whole-message greetings (exact match after normalization).
const GREETING_EXACT: &[&str] = &[
    "hi", "hello", "hey", "bonjour", "bonsoir", "salut", "coucou", "good morning",
    "good afternoon", "good evening", "hola",
];

const ESCALATE_KEYWORDS: &[&str] = &[
    "human", "real person", "agent", "manager", "speak to someone", "talk to someone",
    "complaint", "refund", "lawyer", "unacceptable", "un humain", "une personne",
    "conseiller", "responsable", "plainte", "remboursement", "inacceptable",
];

const CANCELLATION_KEYWORDS: &[&str] = &[
    "cancel", "cancellation", "call off", "can't make it", "cannot make it", "annuler",
    "annulation", "décommander", "decommander",
];

const BOOKING_KEYWORDS: &[&str] = &[
    "book", "booking", "appointment", "reserve", "reservation", "schedule", "slot",
    "available", "availability", "rendez-vous", "rendez vous", "rdv", "réserver", "reserver",
    "réservation", "disponible", "disponibilité", "créneau", "creneau",
];

const LEAD_KEYWORDS: &[&str] = &[
    "quote", "pricing plan", "interested in", "more information", "more info", "call me back",
    "contact me", "devis", "intéressé", "interesse", "plus d'informations", "rappelez-moi",
    "contactez-moi",
];

const FAQ_KEYWORDS: &[&str] = &[
    "price", "cost", "how much", "opening hours", "open", "close", "hours", "address",
    "where are you", "parking", "prix", "combien", "tarif", "horaires", "ouvert", "fermé",
    "adresse", "où êtes",
];

/// Keyword-based intent classifier.
///
/// Rules are checked from most to least specific: an escalation request
/// outranks a cancellation, which outranks a booking (so "cancel my
/// appointment" is a cancellation, not a booking).
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> HeuristicResult {
        let lower = normalize(text);
        if lower.is_empty() {
            return HeuristicResult {
                intent: Intent::General,
                confidence: 0.2,
                reason: "empty message",
            };
        }

        if GREETING_EXACT.iter().any(|g| lower == *g) {
            return HeuristicResult {
                intent: Intent::Greeting,
                confidence: 0.9,
                reason: "greeting",
            };
        }

        if contains_any(&lower, ESCALATE_KEYWORDS) {
            return HeuristicResult {
                intent: Intent::Escalate,
                confidence: 0.7,
                reason: "asks for a human",
            };
        }
        if contains_any(&lower, CANCELLATION_KEYWORDS) {
            return HeuristicResult {
                intent: Intent::Cancellation,
                confidence: 0.7,
                reason: "cancellation keyword",
            };
        }
        if contains_any(&lower, BOOKING_KEYWORDS) {
            return HeuristicResult {
                intent: Intent::Booking,
                confidence: 0.6,
                reason: "booking keyword",
            };
        }
        if contains_any(&lower, LEAD_KEYWORDS) {
            return HeuristicResult {
                intent: Intent::LeadCapture,
                confidence: 0.5,
                reason: "lead keyword",
            };
        }
        if contains_any(&lower, FAQ_KEYWORDS) || lower.ends_with('?') {
            return HeuristicResult {
                intent: Intent::Faq,
                confidence: 0.4,
                reason: "question",
            };
        }

        // Short openers like "hello there" still read as greetings.
        let first = lower.split_whitespace().next().unwrap_or_default();
        if lower.split_whitespace().count() <= 3 && GREETING_EXACT.contains(&first) {
            return HeuristicResult {
                intent: Intent::Greeting,
                confidence: 0.6,
                reason: "short greeting",
            };
        }

        HeuristicResult {
            intent: Intent::General,
            confidence: 0.3,
            reason: "no keyword matched",
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .trim_end_matches(['!', '.', ' '])
        .to_string()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
