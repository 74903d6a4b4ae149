//! InfluxDB writer (v1 `/write` and v2 `/api/v2/write`) over line protocol

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use super::{FieldValue, Point, PointSink};
use crate::error::SinkError;

/// Where and how to write
#[derive(Clone, PartialEq, Eq)]
pub enum InfluxTarget {
    V1 {
        url: String,
        db: String,
        user: Option<String>,
        password: Option<String>,
    },
    V2 {
        url: String,
        org: String,
        bucket: String,
        token: String,
    },
}

impl std::fmt::Debug for InfluxTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfluxTarget::V1 { url, db, user, .. } => f
                .debug_struct("V1")
                .field("url", url)
                .field("db", db)
                .field("user", user)
                .finish_non_exhaustive(),
            InfluxTarget::V2 {
                url, org, bucket, ..
            } => f
                .debug_struct("V2")
                .field("url", url)
                .field("org", org)
                .field("bucket", bucket)
                .finish_non_exhaustive(),
        }
    }
}

/// InfluxDB sink; the HTTP client is created once and reused for every write
pub struct InfluxSink {
    http: Client,
    target: InfluxTarget,
}

impl InfluxSink {
    pub fn new(http: Client, target: InfluxTarget) -> Self {
        Self { http, target }
    }

    pub fn target(&self) -> &InfluxTarget {
        &self.target
    }

    fn request(&self, body: String) -> RequestBuilder {
        match &self.target {
            InfluxTarget::V1 {
                url,
                db,
                user,
                password,
            } => {
                let request = self
                    .http
                    .post(format!("{}/write", url.trim_end_matches('/')))
                    .query(&[("db", db.as_str()), ("precision", "ns")])
                    .body(body);

                match user {
                    Some(user) => request.basic_auth(user, password.as_deref()),
                    None => request,
                }
            }
            InfluxTarget::V2 {
                url,
                org,
                bucket,
                token,
            } => self
                .http
                .post(format!("{}/api/v2/write", url.trim_end_matches('/')))
                .query(&[
                    ("org", org.as_str()),
                    ("bucket", bucket.as_str()),
                    ("precision", "ns"),
                ])
                .header(AUTHORIZATION, format!("Token {token}"))
                .body(body),
        }
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        let line = to_line_protocol(point)?;
        debug!(line = %line, "Writing point to InfluxDB");

        let response = self
            .request(line)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn describe(&self) -> String {
        match &self.target {
            InfluxTarget::V1 { url, db, .. } => format!("influxdb-v1 {url} db={db}"),
            InfluxTarget::V2 { url, bucket, .. } => format!("influxdb-v2 {url} bucket={bucket}"),
        }
    }
}

/// Encode a point as one line of InfluxDB line protocol
pub fn to_line_protocol(point: &Point) -> Result<String, SinkError> {
    if point.fields.is_empty() {
        return Err(SinkError::EmptyPoint);
    }

    let mut line = escape(&point.measurement, &[',', ' ']);

    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        line.push_str(&format!(
            ",{}={}",
            escape(key, &[',', '=', ' ']),
            escape(value, &[',', '=', ' '])
        ));
    }

    let fields: Vec<String> = point
        .fields
        .iter()
        .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), encode_field(value)))
        .collect();
    line.push(' ');
    line.push_str(&fields.join(","));

    if let Some(nanos) = point.timestamp.and_then(|ts| ts.timestamp_nanos_opt()) {
        line.push_str(&format!(" {nanos}"));
    }

    Ok(line)
}

fn encode_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{v:?}"),
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::Boolean(v) => v.to_string(),
        FieldValue::Text(v) => format!("\"{}\"", escape(v, &['"', '\\'])),
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
