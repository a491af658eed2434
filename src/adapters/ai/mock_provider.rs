//! Mock LLM Provider for testing and offline runs.
//!
//! Provides a configurable implementation of the LlmProvider port,
//! allowing flows to run without calling a real model.
//!
//! # Features
//!
//! - Pre-configured responses, consumed in order
//! - Simulated delays for timeout and concurrency testing
//! - Error injection for retry testing
//! - Prompt tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockLlmProvider::new()
//!     .with_error(MockError::ServerError)
//!     .with_response("Hello from the panel");
//!
//! let invoker = LlmInvoker::new(Arc::new(provider.clone()), RetryPolicy::default());
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    Generation, GenerationOptions, LlmProvider, ProviderError, ProviderInfo, TokenUsage,
};

/// Mock LLM provider.
#[derive(Debug, Clone)]
pub struct MockLlmProvider {
    /// Pre-configured responses (consumed in order).
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    info: ProviderInfo,
    /// Simulated latency per request.
    delay: Duration,
    /// Prompts received, in call order.
    calls: Arc<Mutex<Vec<String>>>,
}

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(String),
    Error(MockError),
}

/// Mock error types for testing error handling.
#[derive(Debug, Clone)]
pub enum MockError {
    Timeout,
    RateLimited,
    ServerError,
    Network,
    AuthenticationFailed,
    MalformedRequest,
    QuotaExhausted,
}

impl From<MockError> for ProviderError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::Timeout => ProviderError::timeout("mock timeout"),
            MockError::RateLimited => ProviderError::rate_limited(None),
            MockError::ServerError => ProviderError::server("mock 503"),
            MockError::Network => ProviderError::network("mock connection reset"),
            MockError::AuthenticationFailed => ProviderError::authentication("mock bad api key"),
            MockError::MalformedRequest => ProviderError::malformed("mock malformed request"),
            MockError::QuotaExhausted => ProviderError::quota("mock quota exhausted"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    /// Creates a new mock provider with default settings.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            info: ProviderInfo::new("mock", "mock-model-1"),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        lock(&self.responses).push_back(MockResponse::Success(content.into()));
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: MockError) -> Self {
        lock(&self.responses).push_back(MockResponse::Error(error));
        self
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the number of calls made to this provider.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Returns every prompt received.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Returns the most recent prompt.
    pub fn last_prompt(&self) -> Option<String> {
        lock(&self.calls).last().cloned()
    }

    /// Gets the next response, or a numbered default once the queue is empty.
    fn next_response(&self, call_number: usize) -> MockResponse {
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| MockResponse::Success(format!("Mock response {}", call_number)))
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ProviderError> {
        let call_number = {
            let mut calls = lock(&self.calls);
            calls.push(prompt.to_string());
            calls.len()
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match self.next_response(call_number) {
            MockResponse::Success(content) => {
                let model = options.model.clone().unwrap_or_else(|| self.info.model.clone());
                let usage = TokenUsage::new(
                    (prompt.len() / 4).max(1) as u32,
                    (content.len() / 4).max(1) as u32,
                );
                Ok(Generation::new(content, model).with_usage(usage))
            }
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderErrorKind;

    #[tokio::test]
    async fn returns_responses_in_order() {
        let provider = MockLlmProvider::new()
            .with_response("First")
            .with_response("Second");
        let options = GenerationOptions::new();

        let r1 = provider.generate("p", &options).await.unwrap();
        let r2 = provider.generate("p", &options).await.unwrap();

        assert_eq!(r1.content, "First");
        assert_eq!(r2.content, "Second");
        assert_eq!(r1.model, "mock-model-1");
    }

    #[tokio::test]
    async fn returns_numbered_default_after_exhausted() {
        let provider = MockLlmProvider::new().with_response("Only one");
        let options = GenerationOptions::new();

        provider.generate("p", &options).await.unwrap();
        let r2 = provider.generate("p", &options).await.unwrap();

        assert_eq!(r2.content, "Mock response 2");
    }

    #[tokio::test]
    async fn returns_configured_error() {
        let provider = MockLlmProvider::new().with_error(MockError::RateLimited);
        let err = provider
            .generate("p", &GenerationOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn tracks_prompts() {
        let provider = MockLlmProvider::new();
        assert_eq!(provider.call_count(), 0);

        provider.generate("first prompt", &GenerationOptions::new()).await.unwrap();
        provider.generate("second prompt", &GenerationOptions::new()).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.last_prompt().as_deref(), Some("second prompt"));
    }

    #[tokio::test]
    async fn model_override_is_reported() {
        let provider = MockLlmProvider::new();
        let options = GenerationOptions::new().with_model("custom");
        let generation = provider.generate("p", &options).await.unwrap();
        assert_eq!(generation.model, "custom");
    }
}
