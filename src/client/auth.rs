//! Bearer credential cache for one configured entry

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Tokens this close to expiry are refreshed before use
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Unknown expiry means valid until the server rejects it
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + ChronoDuration::seconds(EXPIRY_SKEW_SECS))
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Login exchange plus cached credential, owned by one entry
pub struct AuthSession {
    http: Client,
    login_url: String,
    email: String,
    password: String,
    cached: Mutex<Option<Credential>>,
}

impl AuthSession {
    pub fn new(
        http: Client,
        base_url: &str,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            login_url: format!("{}/auth/token", base_url.trim_end_matches('/')),
            email: email.into(),
            password: password.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Cached credential if still valid, otherwise a fresh login
    ///
    /// The lock is held across the login so concurrent callers share one exchange.
    pub async fn get_valid_credential(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if !credential.is_expired_at(Utc::now()) {
                return Ok(credential.clone());
            }
            debug!(email = %self.email, "Cached credential expired, refreshing");
        }

        let credential = self.exchange().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Force a login, replacing whatever is cached
    pub async fn login(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        let credential = self.exchange().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential if it is still the rejected one
    pub async fn invalidate(&self, rejected: &Credential) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref() == Some(rejected) {
            debug!(email = %self.email, "Invalidating rejected credential");
            *cached = None;
        }
    }

    pub async fn has_cached(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    async fn exchange(&self) -> Result<Credential, AuthError> {
        let response = self
            .http
            .post(&self.login_url)
            .json(&json!({ "email": self.email, "password": self.password }))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(email = %self.email, status = status.as_u16(), "Molnus login failed");
            return Err(classify_login_failure(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("invalid login response: {e}")))?;

        let credential = parse_login_response(&body, Utc::now())?;
        info!(
            email = %self.email,
            expires_at = ?credential.expires_at,
            "Obtained Molnus credential"
        );
        Ok(credential)
    }
}

fn classify_login_failure(status: StatusCode, body: String) -> AuthError {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        AuthError::InvalidCredentials {
            status: status.as_u16(),
            message: body,
        }
    } else {
        AuthError::Unavailable(format!("HTTP {}", status.as_u16()))
    }
}

/// Extract token and expiry from a login response body
fn parse_login_response(body: &Value, now: DateTime<Utc>) -> Result<Credential, AuthError> {
    let token = ["access_token", "token", "accessToken"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let expires_at = ["expires_at", "expiry", "expiresAt"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            ["expires_in", "expiresIn"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_i64))
                .map(|secs| now + ChronoDuration::seconds(secs))
        });

    Ok(Credential::new(token, expires_at))
}
