//! Interaction recorder configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;

/// Interaction recorder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Root directory of the audit archive
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Buffered writes that trigger an early flush
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,

    /// Live segment size at which it is compressed
    #[serde(default = "default_rotate_bytes")]
    pub rotate_bytes: u64,

    #[serde(default = "default_success_retention")]
    pub success_retention_days: u32,

    #[serde(default = "default_failure_retention")]
    pub failure_retention_days: u32,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl RecorderConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate recorder configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.flush_interval_ms == 0 {
            return Err(ValidationError::InvalidRecorderSetting("flush_interval_ms"));
        }
        if self.buffer_threshold == 0 {
            return Err(ValidationError::InvalidRecorderSetting("buffer_threshold"));
        }
        if self.rotate_bytes == 0 {
            return Err(ValidationError::InvalidRecorderSetting("rotate_bytes"));
        }
        if self.success_retention_days == 0 || self.failure_retention_days == 0 {
            return Err(ValidationError::InvalidRecorderSetting("retention_days"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidRecorderSetting("sweep_interval_secs"));
        }
        Ok(())
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            flush_interval_ms: default_flush_interval(),
            buffer_threshold: default_buffer_threshold(),
            rotate_bytes: default_rotate_bytes(),
            success_retention_days: default_success_retention(),
            failure_retention_days: default_failure_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("./data/interactions")
}

fn default_flush_interval() -> u64 {
    1_000
}

fn default_buffer_threshold() -> usize {
    64
}

fn default_rotate_bytes() -> u64 {
    8 * 1024 * 1024
}

fn default_success_retention() -> u32 {
    30
}

fn default_failure_retention() -> u32 {
    90
}

fn default_sweep_interval() -> u64 {
    3_600
}
