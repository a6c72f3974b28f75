// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow id to definition registry.

use std::collections::HashMap;

use palaver_core::{FlowKind, PalaverError};

use crate::booking::BookingFlow;
use crate::cancellation::CancellationFlow;
use crate::definition::FlowDefinition;
use crate::lead::LeadCaptureFlow;

/// Maps every [`FlowKind`] to its state machine.
#[derive(Default)]
pub struct FlowRegistry {
    flows: HashMap<FlowKind, Box<dyn FlowDefinition>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in booking, lead capture, and cancellation flows.
    pub fn with_builtin_flows() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(BookingFlow));
        registry.register(Box::new(LeadCaptureFlow));
        registry.register(Box::new(CancellationFlow));
        registry
    }

    /// Register a definition, replacing any previous one for the same kind.
    pub fn register(&mut self, flow: Box<dyn FlowDefinition>) {
        self.flows.insert(flow.kind(), flow);
    }

    pub fn get(&self, kind: FlowKind) -> Option<&dyn FlowDefinition> {
        self.flows.get(&kind).map(|f| f.as_ref())
    }

    /// Fails if any flow kind has no definition. Called at startup.
    pub fn validate(&self) -> Result<(), PalaverError> {
        let missing: Vec<String> = FlowKind::ALL
            .iter()
            .filter(|kind| !self.flows.contains_key(kind))
            .map(|kind| kind.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PalaverError::Config(format!(
                "no flow definition registered for: {}",
                missing.join(", ")
            )))
        }
    }
}
