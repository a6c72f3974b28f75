// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound WhatsApp sends through the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use palaver_config::model::WhatsAppConfig;
use palaver_core::{
    AdapterType, ChannelAdapter, HealthStatus, OutboundMessage, PalaverError, PluginAdapter,
};
use serde::Deserialize;
use tracing::{debug, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Twilio rejects longer WhatsApp bodies.
const MAX_BODY_CHARS: usize = 1600;

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    code: Option<i64>,
    message: String,
}

pub struct TwilioTransport {
    client: reqwest::Client,
    endpoint: String,
    account_sid: String,
    auth_token: String,
    status_callback_url: Option<String>,
}

impl TwilioTransport {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, PalaverError> {
        let (Some(account_sid), Some(auth_token)) = (&config.account_sid, &config.auth_token)
        else {
            return Err(PalaverError::Config(
                "whatsapp.account_sid and whatsapp.auth_token are required to send messages".into(),
            ));
        };
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| PalaverError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/2010-04-01/Accounts/{account_sid}/Messages.json",
                config.api_base_url.trim_end_matches('/')
            ),
            account_sid: account_sid.clone(),
            auth_token: auth_token.clone(),
            status_callback_url: config.status_callback_url.clone(),
        })
    }
}

fn whatsapp_address(number: &str) -> String {
    format!("whatsapp:+{}", number.trim_start_matches('+'))
}

fn clip_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl PluginAdapter for TwilioTransport {
    fn name(&self) -> &str {
        "twilio-whatsapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TwilioTransport {
    async fn send(&self, msg: OutboundMessage) -> Result<String, PalaverError> {
        let from = whatsapp_address(&msg.from);
        let to = whatsapp_address(&msg.to);
        let mut form = vec![
            ("From", from.as_str()),
            ("To", to.as_str()),
            ("Body", clip_body(&msg.body)),
        ];
        if let Some(url) = &self.status_callback_url {
            form.push(("StatusCallback", url.as_str()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| PalaverError::Transport {
                message: format!("Twilio request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = match serde_json::from_str::<TwilioError>(&body) {
                Ok(err) => format!(
                    "Twilio rejected send ({status}, code {}): {}",
                    err.code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                    err.message
                ),
                Err(_) => format!("Twilio returned {status}: {body}"),
            };
            warn!(to = %msg.to, "{message}");
            return Err(PalaverError::transport(message));
        }

        let created: CreatedMessage =
            serde_json::from_str(&body).map_err(|e| PalaverError::Transport {
                message: format!("unreadable Twilio response: {e}"),
                source: Some(Box::new(e)),
            })?;
        debug!(sid = %created.sid, to = %msg.to, "WhatsApp message accepted");
        Ok(created.sid)
    }
}
