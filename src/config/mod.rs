//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `ROUNDTABLE` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use roundtable::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod flow;
mod llm;
mod recorder;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use flow::{FlowConfig, RetrievalServiceConfig};
pub use llm::{LlmConfig, LlmProviderKind};
pub use recorder::RecorderConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL connection; in-memory storage when absent
    pub database: Option<DatabaseConfig>,

    /// LLM provider and retry policy
    #[serde(default)]
    pub llm: LlmConfig,

    /// Interaction audit archive
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Template and role sources
    #[serde(default)]
    pub flow: FlowConfig,

    /// Knowledge retrieval service
    #[serde(default)]
    pub retrieval: RetrievalServiceConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `ROUNDTABLE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `ROUNDTABLE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ROUNDTABLE__LLM__API_KEY=...` -> `llm.api_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ROUNDTABLE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.llm.validate()?;
        self.recorder.validate()?;
        self.flow.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
