//! Molnus HTTP client
//!
//! - [`AuthSession`] - cached bearer credential, refreshed on expiry or 401
//! - [`MolnusClient`] - paged `images/get` requests with error classification
//! - [`ImageSource`] - the seam the coordinator fetches through

mod auth;
mod http;

pub use auth::{AuthSession, Credential};
pub use http::{HttpConfig, MolnusClient};

use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// Page size used when neither the caller nor the entry says otherwise
pub const DEFAULT_LIMIT: u32 = 50;

/// One page request for a camera
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct FetchRequest {
    #[builder(into)]
    pub camera_id: String,
    #[builder(default)]
    pub offset: u32,
    #[builder(default = DEFAULT_LIMIT)]
    pub limit: u32,
    #[builder(default)]
    pub wildlife_required: bool,
}

impl FetchRequest {
    /// Same request, advanced to the page after this one
    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            ..self.clone()
        }
    }
}

/// Server-provided image record, untouched until the normalizer sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDetectionRecord(Value);

impl RawDetectionRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// One page of raw records
#[derive(Debug, Clone, Default)]
pub struct ImagePage {
    pub records: Vec<RawDetectionRecord>,
    pub has_more: bool,
}

/// Source of raw detection records
///
/// Implementations classify failures but never retry on their own; retry
/// policy belongs to the caller.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<ImagePage, FetchError>;
}
