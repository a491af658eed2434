//! LLM Provider Port - Interface for language model integrations.
//!
//! Adapters translate a provider's API into a single `generate` call and
//! classify every failure into a [`ProviderErrorKind`] before it reaches the
//! retry policy in the application layer.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//!
//! struct EchoProvider;
//!
//! #[async_trait]
//! impl LlmProvider for EchoProvider {
//!     async fn generate(&self, prompt: &str, _: &GenerationOptions) -> Result<Generation, ProviderError> {
//!         Ok(Generation::new(prompt, "echo"))
//!     }
//!     fn provider_info(&self) -> ProviderInfo {
//!         ProviderInfo::new("echo", "echo")
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{SessionId, StepId};

/// Port for language model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a single prompt.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ProviderError>;

    /// Provider name and model.
    fn provider_info(&self) -> ProviderInfo;
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Overrides the provider's default model.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub metadata: Option<RequestMetadata>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Request metadata for tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    pub session_id: SessionId,
    pub step_id: StepId,
    pub trace_id: String,
}

/// Successful provider output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

impl Generation {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Provider information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    ServerError,
    Network,
    Authentication,
    MalformedRequest,
    QuotaExhausted,
}

impl ProviderErrorKind {
    /// Returns true if a retry might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Timeout
                | ProviderErrorKind::RateLimited
                | ProviderErrorKind::ServerError
                | ProviderErrorKind::Network
        )
    }
}

/// Provider failure, already classified by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Server-suggested wait before retrying.
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ProviderErrorKind::RateLimited, "rate limited by provider")
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServerError, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedRequest, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::QuotaExhausted, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder_works() {
        let options = GenerationOptions::new()
            .with_model("gpt-4o-mini")
            .with_max_tokens(256)
            .with_temperature(0.3);
        assert_eq!(options.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(options.max_tokens, Some(256));
        assert_eq!(options.temperature, Some(0.3));
    }

    #[test]
    fn token_usage_calculates_total() {
        assert_eq!(TokenUsage::new(100, 50).total_tokens, 150);
    }

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ProviderError::timeout("slow").is_transient());
        assert!(ProviderError::rate_limited(None).is_transient());
        assert!(ProviderError::server("502").is_transient());
        assert!(ProviderError::network("reset").is_transient());
    }

    #[test]
    fn permanent_kinds_are_not_retryable() {
        assert!(!ProviderError::authentication("bad key").is_transient());
        assert!(!ProviderError::malformed("bad json").is_transient());
        assert!(!ProviderError::quota("out of credit").is_transient());
    }

    #[test]
    fn llm_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn LlmProvider) {}
    }
}
