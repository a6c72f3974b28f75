// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for Palaver.
//!
//! Implements [`ProviderAdapter`] over the non-streaming Messages API. The
//! same provider serves all three routing tiers; the tier only selects the
//! model named in each request.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use palaver_config::model::AnthropicConfig;
use palaver_core::{
    AdapterType, HealthStatus, PalaverError, PluginAdapter, ProviderAdapter, ProviderMessage,
    ProviderRequest, ProviderResponse, TokenUsage,
};
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

/// Upper bound for one HTTP exchange. The router applies its own, shorter
/// per-tier timeout on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Anthropic provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config, then `ANTHROPIC_API_KEY`, then error.
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    pub fn new(config: &AnthropicConfig) -> Result<Self, PalaverError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = AnthropicClient::new(
            &api_key,
            &config.api_version,
            &config.base_url,
            HTTP_TIMEOUT,
        )?;
        info!(base_url = %config.base_url, "Anthropic provider initialized");
        Ok(Self { client })
    }

    #[cfg(test)]
    fn with_client(client: AnthropicClient) -> Self {
        Self { client }
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: Option<&str>) -> Result<String, PalaverError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }
    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        PalaverError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

/// Shapes history into what the Messages API accepts: it must start with a
/// user turn and roles must alternate. Consecutive turns of the same role
/// are joined with a blank line.
fn to_api_messages(messages: &[ProviderMessage]) -> Vec<ApiMessage> {
    let mut out: Vec<ApiMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let role = if message.role == "assistant" {
            "assistant"
        } else {
            "user"
        };
        if out.is_empty() && role == "assistant" {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => out.push(ApiMessage {
                role: role.to_string(),
                content: message.content.clone(),
            }),
        }
    }
    out
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        // No API call: health checks must not spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        debug!("Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, PalaverError> {
        let messages = to_api_messages(&request.messages);
        if messages.is_empty() {
            return Err(PalaverError::Validation(
                "provider request has no user message".into(),
            ));
        }
        let api_request = MessageRequest {
            model: request.model,
            messages,
            system: request.system_prompt,
            max_tokens: request.max_tokens,
        };
        let response = self.client.complete_message(&api_request).await?;
        Ok(ProviderResponse {
            content: response.text(),
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
            model: response.model,
            stop_reason: response.stop_reason,
        })
    }
}
