// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured conversation flows for Palaver.
//!
//! A flow is a typed state machine that takes over a conversation until it
//! completes or is abandoned. Flows never touch storage: they return replies
//! and [`SideEffect`]s, and the pipeline applies them.

pub mod booking;
pub mod cancellation;
pub mod definition;
pub mod executor;
pub mod lead;
pub mod parse;
pub mod registry;

pub use definition::{FlowContext, FlowDefinition, SideEffect, Step, Transition};
pub use executor::{FlowExecutor, FlowStatus, FlowTurn};
pub use registry::FlowRegistry;
