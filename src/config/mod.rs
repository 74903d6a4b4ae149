//! Configuration management
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use molnus::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Entries: {}", config.entries.len());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MOLNUS__<section>__<key>`
//!
//! Examples:
//! - `MOLNUS__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MOLNUS__SERVICE__REQUEST_TIMEOUT=30s`
//! - `MOLNUS__ENTRIES__HOME__CAMERA_ID=abc123`
//!
//! Secrets left out of the file are read from `MOLNUS_PASSWORD_<ENTRY>`,
//! `MOLNUS_INFLUX_TOKEN_<ENTRY>` and `MOLNUS_INFLUX_PASSWORD_<ENTRY>`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/molnus.toml`.
//! This can be overridden using the `MOLNUS_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, EntryConfig, InfluxVersion, MIN_FETCH_INTERVAL, ServerConfig, ServiceConfig,
    SinkConfig,
};
pub use sources::secret_var;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = sources::load_from_path(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
