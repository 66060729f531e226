//! Configuration for mapster-core
//!
//! Join code generation and storage behavior settings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::join_code::{JOIN_CODE_ALPHABET, MAX_JOIN_CODE_LENGTH, MIN_JOIN_CODE_LENGTH};

/// Core configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsterConfig {
    /// Join code generation parameters
    pub join_code: JoinCodeConfig,
    /// Storage behavior settings
    pub storage: StorageConfig,
}

/// Join code generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinCodeConfig {
    /// Number of symbols in a generated code
    pub length: usize,
    /// Fresh codes drawn before giving up on finding an unused one
    pub max_attempts: u32,
}

impl Default for JoinCodeConfig {
    fn default() -> Self {
        Self {
            length: 16,
            max_attempts: 8,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// How long a unit of work waits for the database write lock
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

impl MapsterConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.join_code.validate()
    }
}

impl JoinCodeConfig {
    /// Check that generated codes are accepted by join code lookups.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 62^8 is the smallest space we accept for a shareable code
        if self.length < MIN_JOIN_CODE_LENGTH {
            return Err(ConfigError::OutOfRange(format!(
                "join_code.length must be at least {} (alphabet has {} symbols)",
                MIN_JOIN_CODE_LENGTH,
                JOIN_CODE_ALPHABET.len()
            )));
        }

        if self.length > MAX_JOIN_CODE_LENGTH {
            return Err(ConfigError::OutOfRange(format!(
                "join_code.length must be at most {}",
                MAX_JOIN_CODE_LENGTH
            )));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::OutOfRange(
                "join_code.max_attempts must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration validation error
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MapsterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.join_code.length, 16);
    }

    #[test]
    fn test_partial_toml() {
        let config = MapsterConfig::from_toml(
            r#"
            [join_code]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.join_code.max_attempts, 3);
        assert_eq!(config.join_code.length, 16);
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_json_config() {
        let config =
            MapsterConfig::from_json(r#"{"storage": {"busy_timeout_ms": 250}}"#).unwrap();
        assert_eq!(config.storage.busy_timeout_ms, 250);
    }

    #[test]
    fn test_short_codes_rejected() {
        let mut config = MapsterConfig::default();
        config.join_code.length = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = MapsterConfig::default();
        config.join_code.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
