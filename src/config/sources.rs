use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "MOLNUS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/molnus.toml";
const ENV_PREFIX: &str = "MOLNUS";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_path(&config_path)
}

/// Load from an explicit file, then environment overrides and secrets
pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
    let mut config = load_from_sources(config_path.to_path_buf())?;
    load_secrets(&mut config, |key| env::var(key).ok());
    Ok(config)
}

/// `MOLNUS_PASSWORD_HOME_CAM` for entry `home-cam`
pub fn secret_var(kind: &str, entry_id: &str) -> String {
    let suffix: String = entry_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ENV_PREFIX}_{kind}_{suffix}")
}

/// Fill secrets absent from the file from per-entry environment variables
fn load_secrets(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    for (entry_id, entry) in config.entries.iter_mut() {
        if entry.password().is_none() {
            if let Some(password) = lookup(&secret_var("PASSWORD", entry_id)) {
                entry.password = Some(password);
            }
        }

        if let Some(sink) = entry.sink.as_mut() {
            if super::models::non_empty(&sink.token).is_none() {
                if let Some(token) = lookup(&secret_var("INFLUX_TOKEN", entry_id)) {
                    sink.token = Some(token);
                }
            }
            if super::models::non_empty(&sink.password).is_none() {
                if let Some(password) = lookup(&secret_var("INFLUX_PASSWORD", entry_id)) {
                    sink.password = Some(password);
                }
            }
        }
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // MOLNUS__SERVICE__BASE_URL -> service.base_url
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
