// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio webhook payloads to domain events.

use std::collections::BTreeMap;

use palaver_core::{
    DeliveryStatus, InboundEvent, MediaRef, PalaverError, StatusCallback, normalize_phone,
};

/// Upper bound on media attachments read from one webhook.
const MAX_MEDIA: usize = 10;

fn required<'a>(params: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, PalaverError> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PalaverError::Validation(format!("missing webhook field {key}")))
}

fn message_sid(params: &BTreeMap<String, String>) -> Result<&str, PalaverError> {
    required(params, "MessageSid").or_else(|_| required(params, "SmsSid"))
}

fn phone(params: &BTreeMap<String, String>, key: &str) -> Result<String, PalaverError> {
    let normalized = normalize_phone(required(params, key)?);
    if normalized.is_empty() {
        return Err(PalaverError::Validation(format!(
            "webhook field {key} is not a phone number"
        )));
    }
    Ok(normalized)
}

/// Parse an inbound-message webhook. Phone numbers come out normalized.
pub fn parse_inbound(
    params: &BTreeMap<String, String>,
    received_at: String,
) -> Result<InboundEvent, PalaverError> {
    let num_media = params
        .get("NumMedia")
        .and_then(|n| n.trim().parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_MEDIA);
    let media = (0..num_media)
        .filter_map(|i| {
            let url = params.get(&format!("MediaUrl{i}"))?;
            Some(MediaRef {
                url: url.clone(),
                content_type: params.get(&format!("MediaContentType{i}")).cloned(),
            })
        })
        .collect();

    Ok(InboundEvent {
        provider_message_id: message_sid(params)?.to_string(),
        from: phone(params, "From")?,
        to: phone(params, "To")?,
        body: params
            .get("Body")
            .map(|b| b.trim().to_string())
            .unwrap_or_default(),
        profile_name: params
            .get("ProfileName")
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        media,
        received_at,
    })
}

/// Map a Twilio `MessageStatus` onto the delivery lifecycle.
pub fn map_status(status: &str) -> Option<DeliveryStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "accepted" | "scheduled" | "queued" | "sending" => Some(DeliveryStatus::Queued),
        "sent" => Some(DeliveryStatus::Sent),
        "delivered" => Some(DeliveryStatus::Delivered),
        "read" => Some(DeliveryStatus::Read),
        "undelivered" | "failed" | "canceled" => Some(DeliveryStatus::Failed),
        _ => None,
    }
}

/// Parse a delivery-status callback.
pub fn parse_status(params: &BTreeMap<String, String>) -> Result<StatusCallback, PalaverError> {
    let raw = required(params, "MessageStatus")?;
    let status = map_status(raw)
        .ok_or_else(|| PalaverError::Validation(format!("unknown message status {raw}")))?;
    Ok(StatusCallback {
        provider_message_id: message_sid(params)?.to_string(),
        status,
        error_code: params
            .get("ErrorCode")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    })
}
