//! Error taxonomy for fetch cycles
//!
//! Every error here is scoped to a single cycle. Nothing is fatal to the
//! process: the coordinator returns to idle and waits for the next trigger.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Authentication failures against the remote service
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("login rejected (HTTP {status}): {message}")]
    InvalidCredentials { status: u16, message: String },

    #[error("token rejected after refresh")]
    TokenRejected,

    #[error("no access token in login response")]
    MissingToken,

    #[error("login endpoint unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification used for logging, metrics and API status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Network,
    Server,
    ConcurrentCycle,
}

/// Failure of a fetch cycle (or of a single page request)
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("rate limited by remote service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("network error: {0}")]
    Network(String),

    #[error("server error{}: {message}", status_suffix(.status))]
    Server { status: Option<u16>, message: String },

    #[error("a fetch cycle is already running for entry '{entry_id}'")]
    ConcurrentCycle { entry_id: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Auth(_) => ErrorKind::Auth,
            FetchError::RateLimited { .. } => ErrorKind::RateLimit,
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::Server { .. } => ErrorKind::Server,
            FetchError::ConcurrentCycle { .. } => ErrorKind::ConcurrentCycle,
        }
    }

    /// Human-facing hint shown by the API and CLI
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Auth(_) => "authentication failed, check credentials".to_string(),
            FetchError::RateLimited {
                retry_after: Some(after),
            } => format!(
                "rate limited by Molnus, retry in {}s or increase the fetch interval",
                after.as_secs()
            ),
            FetchError::RateLimited { retry_after: None } => {
                "rate limited by Molnus, increase the fetch interval".to_string()
            }
            FetchError::Network(msg) => format!("network problem talking to Molnus: {msg}"),
            FetchError::Server { .. } => format!("Molnus returned an error: {self}"),
            FetchError::ConcurrentCycle { .. } => "fetch already in progress, try later".to_string(),
        }
    }

    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network("request timed out".to_string())
        } else if err.is_decode() {
            FetchError::Server {
                status: None,
                message: format!("undecodable response: {err}"),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failure to write a point to the time-series sink
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("sink rejected write (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("sink unreachable: {0}")]
    Transport(String),

    #[error("point has no fields")]
    EmptyPoint,
}

/// Problems with an individual record; the record is skipped, the cycle continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityWarning {
    #[error("record is malformed: {0}")]
    MalformedRecord(String),

    #[error("record has no captureDate")]
    MissingTimestamp,

    #[error("unparsable captureDate '{0}'")]
    UnparsableTimestamp(String),

    #[error("record has no labelled predictions")]
    NoPredictions,

    #[error("record has no image url")]
    MissingImageUrl,

    #[error("accuracy {value} for '{label}' outside [0, 1], clamped")]
    AccuracyOutOfRange { label: String, value: f64 },
}

impl DataQualityWarning {
    /// Whether the record was dropped because of this warning
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DataQualityWarning::MalformedRecord(_)
                | DataQualityWarning::MissingTimestamp
                | DataQualityWarning::UnparsableTimestamp(_)
                | DataQualityWarning::NoPredictions
        )
    }
}
