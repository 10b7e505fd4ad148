#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration for the stagehand orchestrator
//!
//! TOML-loadable settings with per-field serde defaults, so a partial
//! config file only overrides what it names.

use serde::{Deserialize, Serialize};
use stagehand_backoff::BackoffPolicy;
use stagehand_errors::{ConfigError, Error};
use std::path::Path;
use std::time::Duration;

/// Retry configuration for failed steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum tries per step
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Exponential growth factor
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter band as a fraction of the computed delay
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Ceiling on the retry delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Build the backoff policy described by this configuration
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Retry behavior for transient step failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Limits applied to each operation and to the registry
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Deadline for a single step invocation, in seconds
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Maximum operations running at once; excess stays queued
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_operations: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            max_concurrent_operations: default_max_concurrent(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML for this schema.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Deadline for a single step invocation
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.step_timeout_secs)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.limits.max_concurrent_operations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_concurrent_operations".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                field: "retry.jitter_factor".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_step_timeout_secs() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}
