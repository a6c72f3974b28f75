// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for outbound messaging (WhatsApp via Twilio, etc.).

use async_trait::async_trait;

use crate::error::PalaverError;
use crate::traits::adapter::PluginAdapter;
use crate::types::OutboundMessage;

/// Adapter for delivering replies to customers.
///
/// Inbound traffic arrives through webhooks handled by the gateway, so the
/// channel only needs the send half.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Sends a message and returns the provider-assigned message id, which
    /// later delivery-status callbacks reference.
    async fn send(&self, msg: OutboundMessage) -> Result<String, PalaverError>;
}
