//! # Environment-Based Configuration
//!
//! Engine limits and retry policy, loadable from environment variables.
//!
//! ## Environment Variables
//!
//! - `CONDUCTOR_MAX_CONCURRENT_TASKS` - Concurrent handler invocations (default: 10)
//! - `CONDUCTOR_TASK_TIMEOUT_SECS` - Per-task time limit in seconds (default: 300)
//! - `CONDUCTOR_ENABLE_RETRY` - Schedule automatic retries of failed tasks (default: true)
//! - `CONDUCTOR_MAX_RETRIES` - Retry limit for new tasks (default: 3)
//! - `CONDUCTOR_RETRY_DELAY_MS` - Delay before a scheduled retry runs (default: 1000)
//! - `CONDUCTOR_CLEANUP_AFTER_DAYS` - Age cutoff for the cleanup job (default: 30)
//! - `CONDUCTOR_CLEANUP_INTERVAL_SECS` - Period of the cleanup job (default: 3600)

use std::{env, time::Duration};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Validated engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Maximum concurrent handler invocations across the engine
    pub max_concurrent_tasks: usize,
    /// Per-task time limit
    pub task_timeout: Duration,
    /// Whether failed tasks are retried automatically
    pub enable_retry: bool,
    /// Retry limit stamped on new tasks
    pub max_retries: u32,
    /// Delay before a scheduled retry runs
    pub retry_delay: Duration,
    /// Terminal records older than this many days are removed by cleanup
    pub cleanup_after_days: u32,
    /// Period of the background cleanup job
    pub cleanup_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            task_timeout: Duration::from_secs(300),
            enable_retry: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            cleanup_after_days: 30,
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl OrchestratorConfig {
    /// Start a builder with default values.
    #[must_use]
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::new()
    }

    /// Load and validate configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        OrchestratorConfigBuilder::from_env()?.build()
    }
}

/// Builder for [`OrchestratorConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct OrchestratorConfigBuilder {
    max_concurrent_tasks: usize,
    task_timeout_secs: u64,
    enable_retry: bool,
    max_retries: u32,
    retry_delay_ms: u64,
    cleanup_after_days: u32,
    cleanup_interval_secs: u64,
}

impl Default for OrchestratorConfigBuilder {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            max_concurrent_tasks: defaults.max_concurrent_tasks,
            task_timeout_secs: defaults.task_timeout.as_secs(),
            enable_retry: defaults.enable_retry,
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            cleanup_after_days: defaults.cleanup_after_days,
            cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
        }
    }
}

impl OrchestratorConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(n) = get_env_usize("CONDUCTOR_MAX_CONCURRENT_TASKS")? {
            builder = builder.max_concurrent_tasks(n);
        }
        if let Some(secs) = get_env_u64("CONDUCTOR_TASK_TIMEOUT_SECS")? {
            builder = builder.task_timeout_secs(secs);
        }
        if let Some(enabled) = get_env_bool("CONDUCTOR_ENABLE_RETRY")? {
            builder = builder.enable_retry(enabled);
        }
        if let Some(n) = get_env_u32("CONDUCTOR_MAX_RETRIES")? {
            builder = builder.max_retries(n);
        }
        if let Some(ms) = get_env_u64("CONDUCTOR_RETRY_DELAY_MS")? {
            builder = builder.retry_delay_ms(ms);
        }
        if let Some(days) = get_env_u32("CONDUCTOR_CLEANUP_AFTER_DAYS")? {
            builder = builder.cleanup_after_days(days);
        }
        if let Some(secs) = get_env_u64("CONDUCTOR_CLEANUP_INTERVAL_SECS")? {
            builder = builder.cleanup_interval_secs(secs);
        }

        Ok(builder)
    }

    /// Set maximum concurrent handler invocations
    #[must_use]
    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    /// Set per-task timeout in seconds
    #[must_use]
    pub fn task_timeout_secs(mut self, secs: u64) -> Self {
        self.task_timeout_secs = secs;
        self
    }

    /// Enable or disable automatic retries
    #[must_use]
    pub fn enable_retry(mut self, enabled: bool) -> Self {
        self.enable_retry = enabled;
        self
    }

    /// Set the retry limit for new tasks
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the delay before a scheduled retry, in milliseconds
    #[must_use]
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Set the cleanup age cutoff in days
    #[must_use]
    pub fn cleanup_after_days(mut self, days: u32) -> Self {
        self.cleanup_after_days = days;
        self
    }

    /// Set the cleanup job period in seconds
    #[must_use]
    pub fn cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.cleanup_interval_secs = secs;
        self
    }

    /// Validate configuration and build `OrchestratorConfig`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<OrchestratorConfig, ConfigError> {
        self.validate()?;

        Ok(OrchestratorConfig {
            max_concurrent_tasks: self.max_concurrent_tasks,
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            enable_retry: self.enable_retry,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            cleanup_after_days: self.cleanup_after_days,
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_tasks must be greater than 0".to_string(),
            ));
        }

        if self.task_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "task_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.task_timeout_secs > 3600 {
            return Err(ConfigError::ValidationError(
                "task_timeout_secs must be <= 3600 (1 hour)".to_string(),
            ));
        }

        if self.max_retries > 10 {
            return Err(ConfigError::ValidationError(
                "max_retries must be <= 10".to_string(),
            ));
        }

        if self.cleanup_after_days == 0 {
            return Err(ConfigError::ValidationError(
                "cleanup_after_days must be greater than 0".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// Environment variable helper functions

fn get_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!(
                    "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                ),
            }),
        },
        Err(_) => Ok(None),
    }
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u32 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
