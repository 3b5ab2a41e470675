use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::assessment::service::DEFAULT_HISTORY_LIMIT;
use crate::storage::BackendKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Directory of the local history log
    pub path: String,
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: BackendKind::default(),
            path: "./data".to_string(),
            database_url: None,
        }
    }
}

impl Config {
    /// Apply `STORAGE_TYPE`, `DATABASE_URL`, `RESPCALC_DATA_DIR` and `PORT`
    /// from the given lookup on top of the file settings.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("STORAGE_TYPE") {
            self.storage.backend = kind.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(path) = lookup("RESPCALC_DATA_DIR") {
            self.storage.path = path;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", port)))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be at least 1".to_string()));
        }
        if self.storage.backend == BackendKind::Remote && self.storage.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "remote storage requires storage.database_url or DATABASE_URL".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a YAML file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
