//! Configuration management for PromptVault
//!
//! This module provides a centralized configuration system that supports:
//! - YAML/TOML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure for PromptVault
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct VaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

impl VaultConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by PROMPTVAULT_CONFIG env var
    /// 3. ./config/promptvault.yaml
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        if let Ok(config_path) = std::env::var("PROMPTVAULT_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/promptvault").required(false));

        // Override with environment variables
        // Example: PROMPTVAULT_STORAGE__RETRY__MAX_ATTEMPTS=5
        builder = builder.add_source(
            Environment::with_prefix("PROMPTVAULT")
                .separator("__")
                .try_parsing(true),
        );

        let config: VaultConfig = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Set default values for all configuration options
    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            // Storage: backing keys
            .set_default("storage.prompts_key", "prompt_library")?
            .set_default("storage.contexts_key", "context_library")?
            // Storage: atomic-path retry
            .set_default("storage.retry.max_attempts", 3)?
            .set_default("storage.retry.initial_backoff_ms", 100)?
            .set_default("storage.retry.max_backoff_ms", 3200)?
            .set_default("storage.retry.backoff_multiplier", 2.0)?
            // Storage: non-atomic fallback retry
            .set_default("storage.fallback_retry.max_attempts", 3)?
            .set_default("storage.fallback_retry.delay_ms", 50)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.prompts_key.is_empty() {
            return Err(ConfigError::Message(
                "storage.prompts_key must not be empty".to_string(),
            ));
        }

        if self.storage.contexts_key.is_empty() {
            return Err(ConfigError::Message(
                "storage.contexts_key must not be empty".to_string(),
            ));
        }

        if self.storage.prompts_key == self.storage.contexts_key {
            return Err(ConfigError::Message(
                "storage.prompts_key and storage.contexts_key must differ".to_string(),
            ));
        }

        if self.storage.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "storage.retry.max_attempts must be > 0".to_string(),
            ));
        }

        if self.storage.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Message(
                "storage.retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }

        if self.storage.retry.max_backoff_ms < self.storage.retry.initial_backoff_ms {
            return Err(ConfigError::Message(
                "storage.retry.max_backoff_ms must be >= initial_backoff_ms".to_string(),
            ));
        }

        if self.storage.fallback_retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "storage.fallback_retry.max_attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: VaultConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Storage layer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Backing-store key holding the prompt map
    #[serde(default = "default_prompts_key")]
    pub prompts_key: String,

    /// Backing-store key holding the context map
    #[serde(default = "default_contexts_key")]
    pub contexts_key: String,

    /// Retry policy for the atomic (queue-serialized) paths
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retry policy for the non-atomic fallback paths
    #[serde(default)]
    pub fallback_retry: FallbackRetryConfig,
}

fn default_prompts_key() -> String {
    "prompt_library".to_string()
}

fn default_contexts_key() -> String {
    "context_library".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prompts_key: default_prompts_key(),
            contexts_key: default_contexts_key(),
            retry: RetryConfig::default(),
            fallback_retry: FallbackRetryConfig::default(),
        }
    }
}

/// Retry configuration for operations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 3200,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Get initial backoff duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get maximum backoff duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Calculate backoff delay for a given attempt, numbered from 1.
    ///
    /// Computes `min(initial * multiplier^(attempt - 1), max)` as a pure
    /// function of the attempt number, so retry policy is testable without
    /// real delays.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(exponent as i32))
        .min(self.max_backoff_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Fixed-interval retry used by the non-atomic fallback paths
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackRetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for FallbackRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 50,
        }
    }
}

impl FallbackRetryConfig {
    /// Get the fixed delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = VaultConfig::default();

        assert_eq!(config.storage.prompts_key, "prompt_library");
        assert_eq!(config.storage.contexts_key, "context_library");
        assert_eq!(config.storage.retry.max_attempts, 3);
        assert_eq!(config.storage.retry.initial_backoff_ms, 100);
        assert_eq!(config.storage.fallback_retry.max_attempts, 3);
        assert_eq!(config.storage.fallback_retry.delay_ms, 50);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_backoff() {
        let retry = RetryConfig::default();

        // Attempts are numbered from 1.
        assert_eq!(retry.backoff_for_attempt(1).as_millis(), 100);
        assert_eq!(retry.backoff_for_attempt(2).as_millis(), 200);
        assert_eq!(retry.backoff_for_attempt(3).as_millis(), 400);

        // Max backoff cap
        assert_eq!(retry.backoff_for_attempt(10).as_millis(), 3200);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = VaultConfig::default();

        config.storage.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        config.storage.retry.max_attempts = 3;
        assert!(config.validate().is_ok());

        config.storage.contexts_key = config.storage.prompts_key.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_delay() {
        let fallback = FallbackRetryConfig::default();
        assert_eq!(fallback.delay(), Duration::from_millis(50));
    }
}
