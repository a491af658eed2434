//! LLM Provider Adapters.
//!
//! Implementations of the LlmProvider port.
//!
//! ## Available Adapters
//!
//! - `MockLlmProvider` - Configurable mock for tests and offline runs
//! - `OpenAIProvider` - Any OpenAI-compatible chat completions endpoint

mod mock_provider;
mod openai_provider;

pub use mock_provider::{MockError, MockLlmProvider, MockResponse};
pub use openai_provider::{classify_status, OpenAIConfig, OpenAIProvider};
