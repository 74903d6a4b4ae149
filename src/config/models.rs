use crate::client::{DEFAULT_LIMIT, HttpConfig};
use crate::coordinator::{CoordinatorOptions, DEFAULT_CYCLE_TIMEOUT};
use crate::history::DEFAULT_HISTORY_CAP;
use crate::humanize::HumanDuration;
use crate::sink::InfluxTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Shortest timer period, whatever the configured interval
pub const MIN_FETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub entries: BTreeMap<String, EntryConfig>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Remote Molnus service and transport settings shared by all entries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            cycle_timeout: default_cycle_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ServiceConfig {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: self.connect_timeout.as_duration(),
            request_timeout: self.request_timeout.as_duration(),
            user_agent: self.user_agent.clone(),
        }
    }
}

fn default_base_url() -> String {
    "https://molnus.com".to_string()
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(20)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_cycle_timeout() -> HumanDuration {
    HumanDuration(DEFAULT_CYCLE_TIMEOUT)
}

fn default_user_agent() -> String {
    HttpConfig::default().user_agent
}

/// One Molnus account + camera, polled independently of the others
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub email: String,
    /// Falls back to `MOLNUS_PASSWORD_<ENTRY>`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub camera_id: Option<String>,
    #[serde(default = "default_fetch_interval_hours")]
    pub fetch_interval_hours: u64,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default)]
    pub sink: Option<SinkConfig>,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: None,
            camera_id: None,
            fetch_interval_hours: default_fetch_interval_hours(),
            default_limit: default_limit(),
            max_pages: default_max_pages(),
            history_cap: default_history_cap(),
            sink: None,
        }
    }
}

impl EntryConfig {
    pub fn password(&self) -> Option<&str> {
        non_empty(&self.password)
    }

    pub fn camera_id(&self) -> Option<&str> {
        non_empty(&self.camera_id)
    }

    /// Timer period: `fetch_interval_hours`, never below one minute
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_hours.saturating_mul(3600)).max(MIN_FETCH_INTERVAL)
    }

    pub fn coordinator_options(&self, service: &ServiceConfig) -> CoordinatorOptions {
        CoordinatorOptions::builder()
            .cycle_timeout(service.cycle_timeout.as_duration())
            .max_pages(self.max_pages)
            .history_cap(self.history_cap)
            .build()
    }

    /// Resolved sink target, `None` when no sink is configured
    ///
    /// Expects a validated entry; an incomplete section also yields `None`.
    pub fn sink_target(&self) -> Option<InfluxTarget> {
        self.sink.as_ref().and_then(SinkConfig::target)
    }
}

fn default_fetch_interval_hours() -> u64 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_max_pages() -> u32 {
    1
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

/// InfluxDB API flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "VersionRepr", into = "String")]
pub enum InfluxVersion {
    V1,
    #[default]
    V2,
}

/// `"2"` from TOML or `2` from parsed environment values
#[derive(Deserialize)]
#[serde(untagged)]
enum VersionRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<VersionRepr> for InfluxVersion {
    type Error = String;

    fn try_from(value: VersionRepr) -> Result<Self, Self::Error> {
        let text = match value {
            VersionRepr::Number(n) => n.to_string(),
            VersionRepr::Text(s) => s,
        };

        match text.trim().trim_start_matches(['v', 'V']) {
            "1" => Ok(InfluxVersion::V1),
            "2" | "" => Ok(InfluxVersion::V2),
            other => Err(format!("unsupported influx version '{other}', expected 1 or 2")),
        }
    }
}

impl From<InfluxVersion> for String {
    fn from(value: InfluxVersion) -> Self {
        match value {
            InfluxVersion::V1 => "1".to_string(),
            InfluxVersion::V2 => "2".to_string(),
        }
    }
}

/// `[entries.<id>.sink]`; empty strings count as absent
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub version: InfluxVersion,
    #[serde(default)]
    pub url: Option<String>,
    /// v2; falls back to `MOLNUS_INFLUX_TOKEN_<ENTRY>`
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// v1; falls back to `MOLNUS_INFLUX_PASSWORD_<ENTRY>`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl SinkConfig {
    /// Names of every field set to a non-empty value
    pub fn provided_fields(&self) -> Vec<&'static str> {
        [
            ("url", &self.url),
            ("token", &self.token),
            ("org", &self.org),
            ("bucket", &self.bucket),
            ("db", &self.db),
            ("user", &self.user),
            ("password", &self.password),
        ]
        .into_iter()
        .filter(|(_, value)| non_empty(value).is_some())
        .map(|(name, _)| name)
        .collect()
    }

    /// Required fields for the configured version that are still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required = match self.version {
            InfluxVersion::V1 => vec![("url", &self.url), ("db", &self.db)],
            InfluxVersion::V2 => vec![
                ("url", &self.url),
                ("token", &self.token),
                ("org", &self.org),
                ("bucket", &self.bucket),
            ],
        };

        required
            .into_iter()
            .filter(|(_, value)| non_empty(value).is_none())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn target(&self) -> Option<InfluxTarget> {
        let url = non_empty(&self.url)?.to_string();

        match self.version {
            InfluxVersion::V1 => Some(InfluxTarget::V1 {
                url,
                db: non_empty(&self.db)?.to_string(),
                user: non_empty(&self.user).map(str::to_string),
                password: non_empty(&self.password).map(str::to_string),
            }),
            InfluxVersion::V2 => Some(InfluxTarget::V2 {
                url,
                org: non_empty(&self.org)?.to_string(),
                bucket: non_empty(&self.bucket)?.to_string(),
                token: non_empty(&self.token)?.to_string(),
            }),
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.service.base_url, "https://molnus.com");
        assert_eq!(config.service.request_timeout.as_duration(), Duration::from_secs(20));
        assert!(config.entries.is_empty());

        let entry = EntryConfig::default();
        assert_eq!(entry.default_limit, 50);
        assert_eq!(entry.max_pages, 1);
        assert_eq!(entry.history_cap, 500);
        assert_eq!(entry.fetch_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_fetch_interval_floor() {
        let entry = EntryConfig {
            fetch_interval_hours: 0,
            ..EntryConfig::default()
        };
        assert_eq!(entry.fetch_interval(), MIN_FETCH_INTERVAL);

        let entry = EntryConfig {
            fetch_interval_hours: 6,
            ..EntryConfig::default()
        };
        assert_eq!(entry.fetch_interval(), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let entry = EntryConfig {
            password: Some("  ".into()),
            camera_id: Some(String::new()),
            ..EntryConfig::default()
        };
        assert_eq!(entry.password(), None);
        assert_eq!(entry.camera_id(), None);
    }

    #[test]
    fn test_sink_target_v1_and_v2() {
        let v2 = SinkConfig {
            url: Some("http://influx:8086".into()),
            token: Some("t".into()),
            org: Some("o".into()),
            bucket: Some("b".into()),
            ..SinkConfig::default()
        };
        assert!(v2.missing_fields().is_empty());
        assert!(matches!(v2.target(), Some(InfluxTarget::V2 { .. })));

        let v1 = SinkConfig {
            version: InfluxVersion::V1,
            url: Some("http://influx:8086".into()),
            db: Some("wildlife".into()),
            user: Some(String::new()),
            ..SinkConfig::default()
        };
        assert_eq!(
            v1.target(),
            Some(InfluxTarget::V1 {
                url: "http://influx:8086".into(),
                db: "wildlife".into(),
                user: None,
                password: None,
            })
        );

        let partial = SinkConfig {
            url: Some("http://influx:8086".into()),
            ..SinkConfig::default()
        };
        assert_eq!(partial.missing_fields(), vec!["token", "org", "bucket"]);
        assert_eq!(partial.provided_fields(), vec!["url"]);
        assert!(partial.target().is_none());
    }

    #[test]
    fn test_influx_version_parsing() {
        let parse = |v: serde_json::Value| serde_json::from_value::<InfluxVersion>(v);

        assert_eq!(parse(serde_json::json!("1")).unwrap(), InfluxVersion::V1);
        assert_eq!(parse(serde_json::json!(2)).unwrap(), InfluxVersion::V2);
        assert_eq!(parse(serde_json::json!("v2")).unwrap(), InfluxVersion::V2);
        assert!(parse(serde_json::json!("3")).is_err());
    }
}
