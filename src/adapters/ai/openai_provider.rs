//! OpenAI Provider - LlmProvider over an OpenAI-compatible chat completions API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAIConfig::new(api_key)
//!     .with_model("gpt-4o-mini")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let provider = OpenAIProvider::new(config)?;
//! ```
//!
//! The adapter makes exactly one HTTP request per `generate` call. Failures
//! are classified into `ProviderErrorKind`; retrying is left to the caller.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::{
    Generation, GenerationOptions, LlmProvider, ProviderError, ProviderInfo, TokenUsage,
};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Default model.
    pub model: String,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    /// HTTP client timeout.
    pub timeout: Duration,
}

impl OpenAIConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exposes the API key (for making requests).
    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI-compatible API provider.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    /// Creates a provider with its own HTTP client.
    pub fn new(config: OpenAIConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::malformed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn to_openai_request(&self, prompt: &str, options: &GenerationOptions) -> OpenAIRequest {
        OpenAIRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }

    async fn send_request(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Response, ProviderError> {
        let mut request = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("Content-Type", "application/json");

        if let Some(metadata) = &options.metadata {
            request = request.header("X-Request-Id", metadata.trace_id.as_str());
        }

        request
            .json(&self.to_openai_request(prompt, options))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::timeout(format!(
                        "request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    ProviderError::network(format!("Connection failed: {}", e))
                } else {
                    ProviderError::network(e.to_string())
                }
            })
    }

    async fn parse_response(&self, response: Response) -> Result<Generation, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            let mut error = classify_status(status, &body);
            if error.retry_after.is_none() {
                error.retry_after = retry_after;
            }
            return Err(error);
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::server(format!("Failed to parse response: {}", e)))?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::server("No choices in response"))?;

        let usage = openai_response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Generation::new(choice.message.content, openai_response.model).with_usage(usage))
    }
}

/// Maps a non-success HTTP status (and body) to a classified provider error.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = error_message(body).unwrap_or_else(|| body.to_string());

    if body.contains("insufficient_quota") {
        return ProviderError::quota(detail);
    }

    match status.as_u16() {
        401 | 403 => ProviderError::authentication(detail),
        402 => ProviderError::quota(detail),
        400 | 404 | 422 => ProviderError::malformed(detail),
        408 => ProviderError::timeout(detail),
        429 => ProviderError::rate_limited(parse_retry_after(body)),
        500..=599 => ProviderError::server(format!("Server error {}: {}", status, detail)),
        _ => ProviderError::network(format!("Unexpected status {}: {}", status, detail)),
    }
}

fn error_message(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Extracts "try again in Ns" hints from a rate-limit error body.
fn parse_retry_after(body: &str) -> Option<Duration> {
    let message = error_message(body)?;
    let idx = message.find("try again in ")?;
    let rest = &message[idx + "try again in ".len()..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let secs: f64 = rest[..end].parse().ok()?;
    Some(Duration::from_secs_f64(secs))
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ProviderError> {
        let response = self.send_request(prompt, options).await?;
        self.parse_response(response).await
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("openai", &self.config.model)
    }
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderErrorKind;

    fn kind(status: u16, body: &str) -> ProviderErrorKind {
        classify_status(StatusCode::from_u16(status).unwrap(), body).kind
    }

    #[test]
    fn config_builder_works() {
        let config = OpenAIConfig::new("sk-test")
            .with_model("gpt-4o")
            .with_base_url("http://localhost:8080/v1/")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.api_key(), "sk-test");
    }

    #[test]
    fn auth_statuses_are_authentication() {
        assert_eq!(kind(401, ""), ProviderErrorKind::Authentication);
        assert_eq!(kind(403, ""), ProviderErrorKind::Authentication);
    }

    #[test]
    fn quota_is_detected_by_status_and_body() {
        assert_eq!(kind(402, ""), ProviderErrorKind::QuotaExhausted);
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota"}}"#;
        assert_eq!(kind(429, body), ProviderErrorKind::QuotaExhausted);
    }

    #[test]
    fn client_errors_are_malformed() {
        assert_eq!(kind(400, "bad"), ProviderErrorKind::MalformedRequest);
        assert_eq!(kind(404, ""), ProviderErrorKind::MalformedRequest);
        assert_eq!(kind(422, ""), ProviderErrorKind::MalformedRequest);
    }

    #[test]
    fn transient_statuses() {
        assert_eq!(kind(408, ""), ProviderErrorKind::Timeout);
        assert_eq!(kind(429, ""), ProviderErrorKind::RateLimited);
        assert_eq!(kind(500, ""), ProviderErrorKind::ServerError);
        assert_eq!(kind(503, ""), ProviderErrorKind::ServerError);
    }

    #[test]
    fn rate_limit_hint_is_parsed() {
        let body = r#"{"error":{"message":"Rate limit reached. Please try again in 1.5s."}}"#;
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.retry_after, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn error_message_is_extracted_from_body() {
        let body = r#"{"error":{"message":"Invalid model"}}"#;
        let err = classify_status(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.message, "Invalid model");
    }

    #[test]
    fn request_uses_option_model_override() {
        let provider = OpenAIProvider::new(OpenAIConfig::new("k")).unwrap();
        let options = GenerationOptions::new().with_model("other").with_max_tokens(10);
        let request = provider.to_openai_request("hello", &options);
        assert_eq!(request.model, "other");
        assert_eq!(request.max_tokens, Some(10));
        assert_eq!(request.messages[0].content, "hello");
    }
}
