use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

pub mod api;
pub mod dispatch;
pub mod emitter;

/// Configuration for the bot process, loaded from a YAML file.
#[derive(Deserialize, Serialize)]
pub struct Config {
    pub database_url: String,
    pub listen_port: u16,
    /// Base URL of the chat transport used to emit dice. When unset the
    /// process rolls dice locally (dev/testing only).
    #[serde(default)]
    pub transport_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("listen_port must be > 0")]
    InvalidPort,
}

pub struct ValidatedConfig {
    pub database_url: String,
    pub listen_port: u16,
    pub transport_url: Option<String>,
    pub log_level: Level,
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let log_level = Level::from_str(&self.log_level).map_err(|_| {
            ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            }
        })?;
        Ok(ValidatedConfig {
            database_url: self.database_url,
            listen_port: self.listen_port,
            transport_url: self.transport_url,
            log_level,
        })
    }
}
