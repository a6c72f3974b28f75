// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tier ladder: one provider, three models, cheaper on failure.
//!
//! A call requested at a tier runs that tier's model under the AI timeout. If
//! the call errors, times out, or returns a reply the caller cannot use, the
//! ladder retries one tier cheaper until the fast model has been tried. Every
//! attempt is logged as a [`TierCall`] for cost accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use palaver_config::model::RoutingConfig;
use palaver_core::{ProviderAdapter, ProviderRequest, ProviderResponse, Tier, TokenUsage};
use tracing::{debug, warn};

/// Model identifiers for each tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierModels {
    pub fast: String,
    pub standard: String,
    pub premium: String,
}

impl TierModels {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            fast: config.fast_model.clone(),
            standard: config.standard_model.clone(),
            premium: config.premium_model.clone(),
        }
    }

    pub fn for_tier(&self, tier: Tier) -> &str {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Standard => &self.standard,
            Tier::Premium => &self.premium,
        }
    }
}

/// How a single model call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Ok,
    /// The provider returned an error.
    Error,
    /// The call exceeded the AI timeout.
    Timeout,
    /// The provider answered but the reply could not be used.
    Unusable,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Unusable => "unusable",
        }
    }
}

/// One attempt on the ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct TierCall {
    /// Tier the caller asked for.
    pub requested: Tier,
    /// Tier whose model was actually called.
    pub served_by: Tier,
    pub model: String,
    /// Token usage; zero when the provider never answered.
    pub usage: TokenUsage,
    pub outcome: CallOutcome,
    pub latency: Duration,
}

/// The result of running a request down the ladder.
#[derive(Debug, Clone)]
pub struct LadderOutcome<T> {
    /// The accepted value, or `None` when every tier failed.
    pub value: Option<T>,
    /// Tier that produced `value`.
    pub served_by: Option<Tier>,
    pub calls: Vec<TierCall>,
}

impl<T> LadderOutcome<T> {
    /// Whether a cheaper tier than the requested one produced the value.
    pub fn degraded(&self, requested: Tier) -> bool {
        matches!(self.served_by, Some(tier) if tier != requested)
    }
}

/// Runs requests against a provider with per-call timeouts and tier fallback.
#[derive(Clone)]
pub struct ModelLadder {
    provider: Arc<dyn ProviderAdapter>,
    models: TierModels,
    timeout: Duration,
}

impl ModelLadder {
    pub fn new(provider: Arc<dyn ProviderAdapter>, models: TierModels, timeout: Duration) -> Self {
        Self {
            provider,
            models,
            timeout,
        }
    }

    pub fn from_config(provider: Arc<dyn ProviderAdapter>, config: &RoutingConfig) -> Self {
        Self::new(
            provider,
            TierModels::from_config(config),
            Duration::from_millis(config.ai_timeout_ms),
        )
    }

    pub fn models(&self) -> &TierModels {
        &self.models
    }

    /// Run a request starting at `tier` and walking down to the fast model.
    ///
    /// `build` produces the request for a given model; `accept` turns a
    /// response into a usable value or rejects it, which counts as a failed
    /// attempt.
    pub async fn run<T, B, A>(&self, tier: Tier, build: B, accept: A) -> LadderOutcome<T>
    where
        B: Fn(&str) -> ProviderRequest,
        A: Fn(&ProviderResponse) -> Option<T>,
    {
        let mut calls = Vec::new();
        let mut current = Some(tier);

        while let Some(served_by) = current {
            let model = self.models.for_tier(served_by).to_string();
            let request = build(&model);
            let started = Instant::now();
            let result = tokio::time::timeout(self.timeout, self.provider.complete(request)).await;
            let latency = started.elapsed();

            let (outcome, usage, value) = match result {
                Ok(Ok(response)) => match accept(&response) {
                    Some(value) => (CallOutcome::Ok, response.usage, Some(value)),
                    None => (CallOutcome::Unusable, response.usage, None),
                },
                Ok(Err(e)) => {
                    warn!(tier = %served_by, model = %model, error = %e, "tier call failed");
                    (CallOutcome::Error, TokenUsage::default(), None)
                }
                Err(_) => {
                    warn!(
                        tier = %served_by,
                        model = %model,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "tier call timed out"
                    );
                    (CallOutcome::Timeout, TokenUsage::default(), None)
                }
            };

            debug!(
                requested = %tier,
                served_by = %served_by,
                outcome = outcome.as_str(),
                latency_ms = latency.as_millis() as u64,
                "tier call"
            );
            calls.push(TierCall {
                requested: tier,
                served_by,
                model,
                usage,
                outcome,
                latency,
            });

            if let Some(value) = value {
                return LadderOutcome {
                    value: Some(value),
                    served_by: Some(served_by),
                    calls,
                };
            }
            current = served_by.cheaper();
        }

        LadderOutcome {
            value: None,
            served_by: None,
            calls,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_provider {
    //! Scriptable provider for router tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use palaver_core::{
        AdapterType, HealthStatus, PalaverError, PluginAdapter, ProviderAdapter, ProviderRequest,
        ProviderResponse, TokenUsage,
    };

    pub enum Reply {
        Text(String),
        Fail,
        Hang,
    }

    /// Replies are queued per model; an empty queue fails the call.
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        pub requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        pub fn push(&self, model: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .entry(model.to_string())
                .or_default()
                .push_back(reply);
        }

        pub fn models_called(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    #[async_trait]
    impl PluginAdapter for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Provider
        }
        async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), PalaverError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedProvider {
        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, PalaverError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get_mut(&request.model)
                .and_then(|q| q.pop_front());
            match reply {
                Some(Reply::Text(text)) => Ok(ProviderResponse {
                    content: text,
                    model: request.model,
                    usage: TokenUsage {
                        input_tokens: 100,
                        output_tokens: 10,
                    },
                    stop_reason: Some("end_turn".into()),
                }),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(PalaverError::provider("unreachable"))
                }
                Some(Reply::Fail) | None => Err(PalaverError::provider("scripted failure")),
            }
        }
    }
}
