//! Server configuration loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! server on port 9001 that admits up to eight clients.

use crate::companion::{CompanionCatalog, CompanionDef};
use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_bind_address() -> String {
    format!("0.0.0.0:{}", shared::DEFAULT_PORT)
}

fn default_max_clients() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to, e.g. "0.0.0.0:9001"
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Most clients that may be joined at once; checked when a Join arrives
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Back-off after a transient accept failure, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub companions: Vec<CompanionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_clients: default_max_clients(),
            poll_interval_ms: default_poll_interval_ms(),
            logging: LoggingSettings::default(),
            companions: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Reads, parses and validates a config file. Relative companion asset
    /// paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Parses config text as if it had been read from `path`.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ServerError> {
        let mut config: ServerConfig =
            toml::from_str(text).map_err(|source| ServerError::Config {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.companions = config
            .companions
            .into_iter()
            .map(|def| def.resolve_paths(base))
            .collect();

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.bind_address.trim().is_empty() {
            return Err(ServerError::InvalidConfig(
                "bind_address must not be empty".to_string(),
            ));
        }
        if self.max_clients == 0 {
            return Err(ServerError::InvalidConfig(
                "max_clients must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ServerError::InvalidConfig(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        CompanionCatalog::new(self.companions.iter().cloned())?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
