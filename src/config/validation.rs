use super::models::{Config, EntryConfig, SinkConfig};
use std::collections::HashMap;
use thiserror::Error;

/// Page sizes the images endpoint accepts
const LIMIT_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No entries configured (add at least one [entries.<id>] section)")]
    NoEntries,

    #[error("Entry '{entry}' has no email")]
    MissingEmail { entry: String },

    #[error("Entries '{first}' and '{second}' share the account {email}")]
    DuplicateEmail {
        email: String,
        first: String,
        second: String,
    },

    #[error("Entry '{entry}' has no password (set it in the file or MOLNUS_PASSWORD_<ENTRY>)")]
    MissingPassword { entry: String },

    #[error("Entry '{entry}': fetch_interval_hours must be at least 1")]
    InvalidInterval { entry: String },

    #[error("Entry '{entry}': default_limit {value} outside 1..=1000")]
    InvalidLimit { entry: String, value: u32 },

    #[error("Entry '{entry}': max_pages must be at least 1")]
    InvalidMaxPages { entry: String },

    #[error("Entry '{entry}': history_cap must be at least 1")]
    InvalidHistoryCap { entry: String },

    #[error("Entry '{entry}': sink is missing {}", .missing.join(", "))]
    PartialSinkConfig {
        entry: String,
        missing: Vec<&'static str>,
    },

    #[error("Invalid base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("cycle_timeout must be positive")]
    InvalidCycleTimeout,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_service(config)?;

    if config.entries.is_empty() {
        return Err(ValidationError::NoEntries);
    }

    let mut accounts: HashMap<String, &str> = HashMap::new();
    for (entry_id, entry) in &config.entries {
        validate_entry(entry_id, entry)?;

        // one entry per Molnus account
        let email = entry.email.trim().to_lowercase();
        if let Some(first) = accounts.insert(email.clone(), entry_id) {
            return Err(ValidationError::DuplicateEmail {
                email,
                first: first.to_string(),
                second: entry_id.clone(),
            });
        }
    }

    Ok(())
}

fn validate_service(config: &Config) -> Result<(), ValidationError> {
    let base_url = &config.service.base_url;
    let parsed = reqwest::Url::parse(base_url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: base_url.clone(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    if config.service.cycle_timeout.as_duration().is_zero() {
        return Err(ValidationError::InvalidCycleTimeout);
    }

    Ok(())
}

fn validate_entry(entry_id: &str, entry: &EntryConfig) -> Result<(), ValidationError> {
    let entry_name = || entry_id.to_string();

    if entry.email.trim().is_empty() {
        return Err(ValidationError::MissingEmail { entry: entry_name() });
    }

    if entry.password().is_none() {
        return Err(ValidationError::MissingPassword { entry: entry_name() });
    }

    if entry.fetch_interval_hours == 0 {
        return Err(ValidationError::InvalidInterval { entry: entry_name() });
    }

    if !LIMIT_RANGE.contains(&entry.default_limit) {
        return Err(ValidationError::InvalidLimit {
            entry: entry_name(),
            value: entry.default_limit,
        });
    }

    if entry.max_pages == 0 {
        return Err(ValidationError::InvalidMaxPages { entry: entry_name() });
    }

    if entry.history_cap == 0 {
        return Err(ValidationError::InvalidHistoryCap { entry: entry_name() });
    }

    if let Some(sink) = &entry.sink {
        validate_sink(entry_id, sink)?;
    }

    Ok(())
}

/// A sink section is either complete for its version or entirely empty
fn validate_sink(entry_id: &str, sink: &SinkConfig) -> Result<(), ValidationError> {
    if sink.provided_fields().is_empty() {
        return Ok(());
    }

    let missing = sink.missing_fields();
    if !missing.is_empty() {
        return Err(ValidationError::PartialSinkConfig {
            entry: entry_id.to_string(),
            missing,
        });
    }

    Ok(())
}
