//! API utility functions
//!
//! Pure helpers for request parsing, kept out of the handlers for unit testing.

use crate::api::error::ApiError;
use crate::detection::Label;
use crate::registry::FetchTrigger;

/// Trigger bodies are tiny; anything larger is a client bug
pub const MAX_TRIGGER_BODY: usize = 16 * 1024;

/// Validates that body size does not exceed the maximum allowed size
pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

/// Parse a trigger body; an empty body means all defaults
pub fn parse_trigger(data: &[u8]) -> Result<FetchTrigger, ApiError> {
    validate_body_size(data, MAX_TRIGGER_BODY)?;

    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(FetchTrigger::default());
    }

    Ok(serde_json::from_slice(data)?)
}

/// Path segment to label; labels are upper-case on the wire
pub fn parse_label(raw: &str) -> Result<Label, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::InvalidPayload(format!("invalid label '{raw}'")));
    }
    Ok(Label::new(raw.to_ascii_uppercase()))
}
