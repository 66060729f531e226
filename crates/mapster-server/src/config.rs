//! Server configuration
//!
//! Loaded from the TOML file named by `MAPSTER_CONFIG`, then overridden by
//! `MAPSTER_ADDR` and `MAPSTER_DB`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mapster_core::{ConfigError, MapsterConfig, UserId};

use crate::error::ServerError;

pub const CONFIG_ENV: &str = "MAPSTER_CONFIG";
pub const ADDR_ENV: &str = "MAPSTER_ADDR";
pub const DB_ENV: &str = "MAPSTER_DB";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// SQLite database file; in-memory when absent
    pub database_path: Option<PathBuf>,
    /// Bearer token → user id
    pub tokens: BTreeMap<String, UserId>,
    /// Join code and storage settings
    pub core: MapsterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            database_path: None,
            tokens: BTreeMap::new(),
            core: MapsterConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ServerError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml(&contents)?)
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Load using `var` to look up environment variables.
    pub fn load(var: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = match var(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(addr) = var(ADDR_ENV) {
            config.addr = addr;
        }
        if let Some(db) = var(DB_ENV) {
            config.database_path = Some(PathBuf::from(db));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.keys().any(|token| token.trim().is_empty()) {
            return Err(ConfigError::OutOfRange("tokens must not be blank".to_string()));
        }
        self.core.validate()
    }
}
