// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio WhatsApp webhook endpoints.
//!
//! Both endpoints take a form-encoded body and are gated by
//! `X-Twilio-Signature`. Inbound messages are acknowledged with an empty
//! TwiML document right away; the pipeline runs on a task tracked by
//! [`GatewayState::turns`] so a slow model call never trips Twilio's webhook
//! timeout and shutdown can wait for it.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use palaver_core::now_timestamp;
use palaver_whatsapp::{map_status, parse_inbound, parse_status, verify_signature};
use tracing::{debug, error, warn};

use crate::server::{GatewayState, WebhookAuth};

pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

const SIGNATURE_HEADER: &str = "x-twilio-signature";

fn twiml() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        EMPTY_TWIML,
    )
        .into_response()
}

fn decode_form(body: &[u8]) -> Result<BTreeMap<String, String>, StatusCode> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
        .map(|pairs| pairs.into_iter().collect())
        .map_err(|e| {
            warn!(error = %e, "webhook body is not form-encoded");
            StatusCode::BAD_REQUEST
        })
}

/// The URL Twilio signed: the configured public base URL, or the request's
/// own `Host` when none is configured, plus path and query.
fn signing_url(auth: &WebhookAuth, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    match &auth.public_url {
        Some(base) => format!("{}{path}", base.trim_end_matches('/')),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            format!("{scheme}://{host}{path}")
        }
    }
}

fn authenticate(
    auth: &WebhookAuth,
    headers: &HeaderMap,
    uri: &Uri,
    params: &BTreeMap<String, String>,
) -> Result<(), StatusCode> {
    if !auth.verify_signatures {
        return Ok(());
    }
    let Some(token) = auth.auth_token.as_deref() else {
        error!("webhook signature verification enabled but no auth token configured -- rejecting");
        return Err(StatusCode::UNAUTHORIZED);
    };
    let url = signing_url(auth, headers, uri);
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if verify_signature(token, &url, params, signature) {
        Ok(())
    } else {
        warn!(url = %url, has_signature = signature.is_some(), "webhook signature rejected");
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// POST /webhooks/whatsapp
pub async fn post_inbound(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let params = match decode_form(&body) {
        Ok(params) => params,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = authenticate(&state.webhook, &headers, &uri, &params) {
        return status.into_response();
    }

    let event = match parse_inbound(&params, now_timestamp()) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "inbound webhook rejected");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    debug!(provider_message_id = %event.provider_message_id, "inbound webhook accepted");
    let pipeline = state.pipeline.clone();
    state.turns.spawn(async move {
        pipeline.handle_inbound(event).await;
    });

    twiml()
}

/// POST /webhooks/whatsapp/status
pub async fn post_status(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let params = match decode_form(&body) {
        Ok(params) => params,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = authenticate(&state.webhook, &headers, &uri, &params) {
        return status.into_response();
    }

    // Twilio also reports states outside the delivery lifecycle (e.g.
    // `receiving`); acknowledge those without touching storage.
    if let Some(raw) = params.get("MessageStatus") {
        if map_status(raw).is_none() {
            debug!(status = %raw, "ignoring unmapped message status");
            return twiml();
        }
    }

    match parse_status(&params) {
        Ok(callback) => {
            state.pipeline.handle_status(callback).await;
            twiml()
        }
        Err(e) => {
            warn!(error = %e, "status webhook rejected");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
