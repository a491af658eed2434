//! Flow definition and retrieval configuration

use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;

/// Where flow templates and roles are read from
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Directory of `*.yaml` flow templates
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// YAML file listing role profiles
    #[serde(default = "default_roles_file")]
    pub roles_file: PathBuf,

    /// Time allowed for knowledge retrieval within a step
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_ms: u64,
}

impl FlowConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retrieval_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            roles_file: default_roles_file(),
            retrieval_timeout_ms: default_retrieval_timeout(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("./flows/templates")
}

fn default_roles_file() -> PathBuf {
    PathBuf::from("./flows/roles.yaml")
}

fn default_retrieval_timeout() -> u64 {
    3_000
}

/// Knowledge retrieval service; disabled when `base_url` is unset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalServiceConfig {
    pub base_url: Option<String>,

    pub api_key: Option<Secret<String>>,
}

impl RetrievalServiceConfig {
    pub fn is_enabled(&self) -> bool {
        self.base_url.as_ref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.base_url {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                Err(ValidationError::InvalidRetrievalUrl)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.retrieval_timeout(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retrieval_disabled_by_default() {
        let config = RetrievalServiceConfig::default();
        assert!(!config.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retrieval_url_must_be_http() {
        let config = RetrievalServiceConfig {
            base_url: Some("ftp://search".to_string()),
            api_key: None,
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRetrievalUrl));
    }
}
