// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp channel adapter backed by Twilio.
//!
//! Inbound: form-encoded webhooks are validated with [`verify_signature`] and
//! turned into [`palaver_core::InboundEvent`]s or status callbacks.
//! Outbound: [`TwilioTransport`] implements [`palaver_core::ChannelAdapter`].

pub mod signature;
pub mod transport;
pub mod webhook;

pub use signature::{compute_signature, verify_signature};
pub use transport::TwilioTransport;
pub use webhook::{map_status, parse_inbound, parse_status};
