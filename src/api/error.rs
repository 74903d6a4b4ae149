use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::error::FetchError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("service is shutting down")]
    ShuttingDown,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Fetch(FetchError::ConcurrentCycle { .. }) => StatusCode::CONFLICT,
            ApiError::Fetch(FetchError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Fetch(FetchError::Auth(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Fetch(FetchError::Network(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Fetch(FetchError::Server { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Fetch(FetchError::ConcurrentCycle { .. }) => "FETCH_IN_PROGRESS",
            ApiError::Fetch(FetchError::RateLimited { .. }) => "RATE_LIMITED",
            ApiError::Fetch(FetchError::Auth(_)) => "AUTH_FAILED",
            ApiError::Fetch(FetchError::Network(_)) => "NETWORK_ERROR",
            ApiError::Fetch(FetchError::Server { .. }) => "UPSTREAM_ERROR",
            ApiError::ShuttingDown => "SHUTTING_DOWN",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Fetch(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.message(),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Fetch(FetchError::RateLimited {
            retry_after: Some(after),
        }) = &self
        {
            if let Ok(value) = HeaderValue::from_str(&after.as_secs().to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::EntryNotFound(_) | RegistryError::NoEntries => {
                ApiError::NotFound(value.to_string())
            }
            RegistryError::CameraUnresolved { .. } | RegistryError::InvalidLimit(_) => {
                ApiError::InvalidPayload(value.to_string())
            }
            RegistryError::Client(e) => ApiError::Internal(e.to_string()),
        }
    }
}
