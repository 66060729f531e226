//! Join code generation.
//!
//! Codes are drawn from a caller-supplied cryptographically secure generator.
//! Uniqueness is not assumed: the lifecycle manager checks each candidate
//! against the store and draws again on collision.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{CryptoRng, Rng, RngCore, SeedableRng};

use crate::config::{ConfigError, JoinCodeConfig};
use crate::error::StoreError;

/// Symbols a join code is drawn from.
pub const JOIN_CODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Shortest configurable code length.
pub const MIN_JOIN_CODE_LENGTH: usize = 8;

/// Longest code a lookup will accept.
pub const MAX_JOIN_CODE_LENGTH: usize = 64;

/// Draws fixed-length join codes from a secure random source.
pub struct JoinCodeGenerator<R = StdRng> {
    rng: Mutex<R>,
    length: usize,
    max_attempts: u32,
}

impl JoinCodeGenerator<StdRng> {
    /// Generator seeded from the operating system.
    pub fn from_os_rng(config: &JoinCodeConfig) -> Result<Self, ConfigError> {
        Self::new(StdRng::from_os_rng(), config)
    }
}

impl<R: RngCore + CryptoRng> JoinCodeGenerator<R> {
    /// Fails when `config` would produce codes that lookups reject.
    pub fn new(rng: R, config: &JoinCodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            rng: Mutex::new(rng),
            length: config.length,
            max_attempts: config.max_attempts,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw one candidate code.
    pub fn generate(&self) -> Result<String, StoreError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|e| StoreError::Storage(format!("join code rng poisoned: {}", e)))?;
        let code = (0..self.length)
            .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
            .collect();
        Ok(code)
    }
}

/// Whether `code` could have been produced by any generator configuration.
pub fn is_well_formed(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_JOIN_CODE_LENGTH
        && code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b))
}
