//! LLM invocation with timeout and retry policy.
//!
//! Each attempt is bounded by `attempt_timeout`; an elapsed timeout counts as
//! a transient failure. Transient failures are retried with exponential
//! backoff until `max_attempts` is reached. Authentication, quota and
//! malformed-request failures are returned on the first occurrence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout};

use crate::ports::{
    Generation, GenerationOptions, LlmProvider, ProviderError, ProviderErrorKind, RequestMetadata,
    TokenUsage,
};

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry and timeout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    ///
    /// A server-provided `retry_after` hint raises the delay, still capped.
    pub fn backoff_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .base_backoff
            .checked_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .unwrap_or(self.max_backoff);
        let delay = match retry_after {
            Some(hint) => exponential.max(hint),
            None => exponential,
        };
        delay.min(self.max_backoff)
    }
}

/// Normalized result of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall time across all attempts and backoff sleeps.
    pub total_duration: Duration,
    /// Duration of each individual attempt, in order.
    pub attempt_durations: Vec<Duration>,
    pub prompt_chars: usize,
    pub response_chars: usize,
}

/// Terminal invocation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// Every attempt failed transiently.
    #[error("provider failed after {attempts} attempts: {last}")]
    TransientExhausted {
        last: ProviderError,
        attempts: u32,
        total_duration: Duration,
    },

    #[error("provider authentication failed: {error}")]
    Auth {
        error: ProviderError,
        attempts: u32,
        total_duration: Duration,
    },

    #[error("provider quota exhausted: {error}")]
    Quota {
        error: ProviderError,
        attempts: u32,
        total_duration: Duration,
    },

    /// The provider rejected the request as malformed.
    #[error("provider rejected request: {error}")]
    Rejected {
        error: ProviderError,
        attempts: u32,
        total_duration: Duration,
    },
}

impl InvocationError {
    fn permanent(error: ProviderError, attempts: u32, total_duration: Duration) -> Self {
        match error.kind {
            ProviderErrorKind::Authentication => InvocationError::Auth {
                error,
                attempts,
                total_duration,
            },
            ProviderErrorKind::QuotaExhausted => InvocationError::Quota {
                error,
                attempts,
                total_duration,
            },
            _ => InvocationError::Rejected {
                error,
                attempts,
                total_duration,
            },
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            InvocationError::TransientExhausted { attempts, .. }
            | InvocationError::Auth { attempts, .. }
            | InvocationError::Quota { attempts, .. }
            | InvocationError::Rejected { attempts, .. } => *attempts,
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            InvocationError::TransientExhausted { total_duration, .. }
            | InvocationError::Auth { total_duration, .. }
            | InvocationError::Quota { total_duration, .. }
            | InvocationError::Rejected { total_duration, .. } => *total_duration,
        }
    }

    /// The last provider error seen.
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            InvocationError::TransientExhausted { last, .. } => last,
            InvocationError::Auth { error, .. }
            | InvocationError::Quota { error, .. }
            | InvocationError::Rejected { error, .. } => error,
        }
    }
}

/// Calls an LLM provider under a retry policy.
#[derive(Clone)]
pub struct LlmInvoker {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    options: GenerationOptions,
}

impl LlmInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            options: GenerationOptions::default(),
        }
    }

    /// Sets the options applied to every call.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generates a completion for `prompt`, retrying transient failures.
    pub async fn invoke(
        &self,
        prompt: &str,
        metadata: Option<RequestMetadata>,
    ) -> Result<InvocationOutcome, InvocationError> {
        let mut options = self.options.clone();
        options.metadata = metadata;

        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt_durations = Vec::with_capacity(max_attempts as usize);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_started = Instant::now();
            let result = match timeout(
                self.policy.attempt_timeout,
                self.provider.generate(prompt, &options),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(format!(
                    "no response within {}ms",
                    self.policy.attempt_timeout.as_millis()
                ))),
            };
            let elapsed = attempt_started.elapsed();
            attempt_durations.push(elapsed);

            let error = match result {
                Ok(generation) => {
                    tracing::debug!(
                        attempt,
                        duration_ms = elapsed.as_millis() as u64,
                        "provider call succeeded"
                    );
                    return Ok(self.outcome(prompt, generation, attempt, started, attempt_durations));
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::warn!(
                    attempt,
                    kind = ?error.kind,
                    error = %error.message,
                    "provider call failed permanently"
                );
                return Err(InvocationError::permanent(error, attempt, started.elapsed()));
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    attempt,
                    kind = ?error.kind,
                    error = %error.message,
                    "provider retries exhausted"
                );
                return Err(InvocationError::TransientExhausted {
                    last: error,
                    attempts: attempt,
                    total_duration: started.elapsed(),
                });
            }

            let delay = self.policy.backoff_for(attempt - 1, error.retry_after);
            tracing::info!(
                attempt,
                kind = ?error.kind,
                delay_ms = delay.as_millis() as u64,
                "transient provider failure, retrying"
            );
            sleep(delay).await;
        }
    }

    fn outcome(
        &self,
        prompt: &str,
        generation: Generation,
        attempts: u32,
        started: Instant,
        attempt_durations: Vec<Duration>,
    ) -> InvocationOutcome {
        InvocationOutcome {
            prompt_chars: prompt.chars().count(),
            response_chars: generation.content.chars().count(),
            content: generation.content,
            model: generation.model,
            usage: generation.usage,
            attempts,
            total_duration: started.elapsed(),
            attempt_durations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockError, MockLlmProvider};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(4))
            .with_attempt_timeout(Duration::from_secs(5))
    }

    fn invoker(provider: &MockLlmProvider, max_attempts: u32) -> LlmInvoker {
        LlmInvoker::new(Arc::new(provider.clone()), fast_policy(max_attempts))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1, None), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2, None), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40, None), Duration::from_millis(350));
    }

    #[test]
    fn retry_after_hint_raises_backoff_within_cap() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(
            policy.backoff_for(0, Some(Duration::from_millis(600))),
            Duration::from_millis(600)
        );
        assert_eq!(
            policy.backoff_for(0, Some(Duration::from_secs(30))),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let provider = MockLlmProvider::new().with_response("hello");
        let outcome = invoker(&provider, 3).invoke("prompt", None).await.unwrap();
        assert_eq!(outcome.content, "hello");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.attempt_durations.len(), 1);
        assert_eq!(outcome.prompt_chars, 6);
        assert_eq!(outcome.response_chars, 5);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let provider = MockLlmProvider::new()
            .with_error(MockError::ServerError)
            .with_error(MockError::RateLimited)
            .with_response("third time lucky");
        let outcome = invoker(&provider, 3).invoke("p", None).await.unwrap();
        assert_eq!(outcome.content, "third time lucky");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.attempt_durations.len(), 3);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_is_transient_failure() {
        let provider = MockLlmProvider::new()
            .with_error(MockError::Network)
            .with_error(MockError::Timeout);
        let err = invoker(&provider, 2).invoke("p", None).await.unwrap_err();
        assert!(matches!(err, InvocationError::TransientExhausted { attempts: 2, .. }));
        assert_eq!(err.provider_error().kind, ProviderErrorKind::Timeout);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let provider = MockLlmProvider::new()
            .with_error(MockError::AuthenticationFailed)
            .with_response("never reached");
        let err = invoker(&provider, 5).invoke("p", None).await.unwrap_err();
        assert!(matches!(err, InvocationError::Auth { attempts: 1, .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn quota_and_malformed_are_not_retried() {
        let provider = MockLlmProvider::new().with_error(MockError::QuotaExhausted);
        let err = invoker(&provider, 5).invoke("p", None).await.unwrap_err();
        assert!(matches!(err, InvocationError::Quota { .. }));

        let provider = MockLlmProvider::new().with_error(MockError::MalformedRequest);
        let err = invoker(&provider, 5).invoke("p", None).await.unwrap_err();
        assert!(matches!(err, InvocationError::Rejected { .. }));
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_is_retried() {
        let slow = MockLlmProvider::new().with_delay(Duration::from_millis(200));
        let policy = fast_policy(2).with_attempt_timeout(Duration::from_millis(20));
        let err = LlmInvoker::new(Arc::new(slow.clone()), policy)
            .invoke("p", None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::TransientExhausted { attempts: 2, .. }));
        assert_eq!(err.provider_error().kind, ProviderErrorKind::Timeout);
        assert_eq!(slow.call_count(), 2);
    }
}
