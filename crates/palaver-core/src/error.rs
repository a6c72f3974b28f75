// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Palaver messaging pipeline.

use thiserror::Error;

/// The primary error type used across all Palaver adapter traits and pipeline stages.
#[derive(Debug, Error)]
pub enum PalaverError {
    /// Configuration errors (invalid TOML, missing secrets, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// AI provider errors (API failure, malformed reply, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging transport errors (outbound send rejected, network failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Inbound payload rejected (missing fields, bad signature).
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PalaverError {
    /// Construct a storage error from any error source.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Construct a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Construct a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the failure is a dependency hiccup the pipeline should degrade
    /// around (retry a cheaper tier, send the fallback reply) rather than a
    /// caller mistake.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Provider { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(PalaverError::provider("429").is_transient());
        assert!(PalaverError::transport("down").is_transient());
        assert!(
            PalaverError::Timeout {
                duration: std::time::Duration::from_secs(1)
            }
            .is_transient()
        );
        assert!(PalaverError::storage(std::io::Error::other("locked")).is_transient());
        assert!(!PalaverError::Validation("missing From".into()).is_transient());
        assert!(!PalaverError::Config("no secret".into()).is_transient());
        assert!(!PalaverError::Internal("bug".into()).is_transient());
    }

    #[test]
    fn display_includes_message() {
        let err = PalaverError::provider("rate limited");
        assert_eq!(err.to_string(), "provider error: rate limited");
    }
}
