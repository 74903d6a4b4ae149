//! reqwest-backed client for the Molnus images endpoint

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, ORIGIN, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::auth::{AuthSession, Credential};
use super::{FetchRequest, ImagePage, ImageSource, RawDetectionRecord};
use crate::error::{AuthError, FetchError};

/// Upstream error bodies are cut to this many characters in messages
const MAX_ERROR_BODY: usize = 256;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
            user_agent: concat!("molnus-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Build the shared transport; cheap to clone afterwards
    pub fn build_client(&self) -> Result<Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(&self.user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
    }
}

/// `images/get` response: the usual envelope, or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImagesPayload {
    Bare(Vec<Value>),
    Envelope {
        #[serde(default)]
        images: Vec<Value>,
        #[serde(default, rename = "hasMore")]
        has_more: bool,
    },
}

impl From<ImagesPayload> for ImagePage {
    fn from(payload: ImagesPayload) -> Self {
        let (images, has_more) = match payload {
            ImagesPayload::Bare(images) => (images, false),
            ImagesPayload::Envelope { images, has_more } => (images, has_more),
        };

        ImagePage {
            records: images.into_iter().map(RawDetectionRecord::new).collect(),
            has_more,
        }
    }
}

/// Molnus API client bound to one entry's session
pub struct MolnusClient {
    http: Client,
    base_url: String,
    session: Arc<AuthSession>,
}

impl MolnusClient {
    pub fn new(http: Client, base_url: &str, session: Arc<AuthSession>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    async fn send_images_request(
        &self,
        request: &FetchRequest,
        credential: &Credential,
    ) -> Result<Response, FetchError> {
        debug!(
            camera_id = %request.camera_id,
            offset = request.offset,
            limit = request.limit,
            "Requesting images"
        );

        self.http
            .get(format!("{}/images/get", self.base_url))
            .header(AUTHORIZATION, credential.bearer())
            .header(ORIGIN, &self.base_url)
            .query(&[
                ("CameraId", request.camera_id.clone()),
                ("offset", request.offset.to_string()),
                ("limit", request.limit.to_string()),
                ("wildlifeRequired", request.wildlife_required.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&e))
    }
}

#[async_trait]
impl ImageSource for MolnusClient {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<ImagePage, FetchError> {
        let credential = self.session.get_valid_credential().await?;
        let mut response = self.send_images_request(request, &credential).await?;

        // One refresh per call; a second 401 surfaces as an auth failure.
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(camera_id = %request.camera_id, "Token rejected, refreshing once");
            self.session.invalidate(&credential).await;

            let refreshed = self.session.get_valid_credential().await?;
            response = self.send_images_request(request, &refreshed).await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                self.session.invalidate(&refreshed).await;
                return Err(AuthError::TokenRejected.into());
            }
        }

        let response = check_status(response).await?;
        let payload: ImagesPayload = response
            .json()
            .await
            .map_err(|e| FetchError::from_transport(&e))?;

        let page = ImagePage::from(payload);
        debug!(
            camera_id = %request.camera_id,
            records = page.records.len(),
            has_more = page.has_more,
            "Images page received"
        );
        Ok(page)
    }
}

/// Map non-2xx responses onto the fetch error taxonomy
async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(response.headers(), Utc::now());
        warn!(?retry_after, "Molnus rate limit hit");
        return Err(FetchError::RateLimited { retry_after });
    }

    if status == StatusCode::FORBIDDEN {
        return Err(AuthError::TokenRejected.into());
    }

    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Server {
        status: Some(status.as_u16()),
        message: truncate(&body, MAX_ERROR_BODY),
    })
}

/// `Retry-After` as delay-seconds or an HTTP date
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok()
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert!(config.user_agent.starts_with("molnus-bridge/"));
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn test_payload_envelope() {
        let payload: ImagesPayload = serde_json::from_value(json!({
            "success": true,
            "images": [{"id": 1}, {"id": 2}],
            "hasMore": true
        }))
        .unwrap();

        let page = ImagePage::from(payload);
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more);
    }

    #[test]
    fn test_payload_bare_array() {
        let payload: ImagesPayload =
            serde_json::from_value(json!([{"id": 1}, {"id": 2}, {"id": 3}])).unwrap();

        let page = ImagePage::from(payload);
        assert_eq!(page.records.len(), 3);
        assert!(!page.has_more);
    }

    #[test]
    fn test_retry_after_seconds_and_date() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(120))
        );

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Sun, 01 Jun 2025 12:01:00 +0000"),
        );
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(60))
        );

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, now), None);

        assert_eq!(parse_retry_after(&HeaderMap::new(), now), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
