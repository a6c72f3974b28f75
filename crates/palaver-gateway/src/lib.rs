// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Palaver.
//!
//! Serves the Twilio WhatsApp webhooks that feed the pipeline, the
//! unauthenticated `/health` and `/metrics` endpoints, and a small
//! bearer-authenticated admin API for tenant-cache and agent management.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod webhooks;

pub use auth::AuthConfig;
pub use server::{
    GatewayState, HealthState, WebhookAuth, build_router, drain_turns, start_server,
};
pub use webhooks::EMPTY_TWIML;
