// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Palaver integration tests.
//!
//! Provides mock adapters and a test harness for fast, deterministic tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock AI provider with per-model scripted responses
//! - [`MockTransport`] - Mock WhatsApp transport capturing outbound messages
//! - [`TestHarness`] - Full pipeline over a temp database

pub mod harness;
pub mod mock_provider;
pub mod mock_transport;

pub use harness::{
    FAST_MODEL, PREMIUM_MODEL, STANDARD_MODEL, TestHarness, TestHarnessBuilder, agent,
    classification, inbound, tenant,
};
pub use mock_provider::MockProvider;
pub use mock_transport::MockTransport;
