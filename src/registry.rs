//! Configured entries and trigger resolution
//!
//! Each entry owns its auth session, client, coordinator and optional sink.
//! "First entry" means the lowest entry id, matching the config file's
//! ordered map.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::{AuthSession, FetchRequest, MolnusClient};
use crate::config::{Config, EntryConfig};
use crate::coordinator::FetchCoordinator;
use crate::observability::Metrics;
use crate::sink::{DetectionSink, InfluxSink};

const LIMIT_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no entries configured")]
    NoEntries,

    #[error("entry '{0}' not found")]
    EntryNotFound(String),

    #[error("no camera_id given and entry '{entry_id}' has no default camera")]
    CameraUnresolved { entry_id: String },

    #[error("limit {0} outside 1..=1000")]
    InvalidLimit(u32),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// On-demand trigger parameters (API body and `molnus fetch` flags)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchTrigger {
    pub entry_id: Option<String>,
    pub camera_id: Option<String>,
    pub offset: u32,
    /// Entry's `default_limit` when absent
    pub limit: Option<u32>,
    pub wildlife_required: bool,
}

/// One configured entry and everything it owns
pub struct Entry {
    id: String,
    config: EntryConfig,
    session: Arc<AuthSession>,
    coordinator: Arc<FetchCoordinator>,
}

impl Entry {
    pub fn new(
        id: impl Into<String>,
        config: EntryConfig,
        session: Arc<AuthSession>,
        coordinator: Arc<FetchCoordinator>,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            session,
            coordinator,
        }
    }

    /// Wire session, client, sink and coordinator for a configured entry
    pub fn from_config(
        id: &str,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Result<Self, RegistryError> {
        let entry = config
            .entries
            .get(id)
            .ok_or_else(|| RegistryError::EntryNotFound(id.to_string()))?;

        let http = config.service.http_config().build_client()?;
        let session = Arc::new(AuthSession::new(
            http.clone(),
            &config.service.base_url,
            entry.email.clone(),
            entry.password().unwrap_or_default(),
        ));
        let client = MolnusClient::new(http.clone(), &config.service.base_url, session.clone());

        let mut coordinator = FetchCoordinator::new(
            id,
            Arc::new(client),
            entry.coordinator_options(&config.service),
            metrics,
        );
        if let Some(target) = entry.sink_target() {
            let sink = DetectionSink::new(Arc::new(InfluxSink::new(http, target)));
            info!(entry_id = %id, sink = %sink.describe(), "Sink enabled");
            coordinator = coordinator.with_sink(sink);
        }

        Ok(Self::new(id, entry.clone(), session, Arc::new(coordinator)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &EntryConfig {
        &self.config
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.config.camera_id()
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    /// Request issued by the timer, `None` without a default camera
    pub fn scheduled_request(&self) -> Option<FetchRequest> {
        let camera_id = self.camera_id()?;
        Some(
            FetchRequest::builder()
                .camera_id(camera_id)
                .limit(self.config.default_limit)
                .build(),
        )
    }
}

#[derive(Default)]
pub struct EntryRegistry {
    entries: BTreeMap<String, Arc<Entry>>,
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for id in config.entries.keys() {
            registry.insert(Entry::from_config(id, config, metrics.clone())?);
        }

        if registry.is_empty() {
            return Err(RegistryError::NoEntries);
        }

        info!(entries = registry.len(), "Entry registry ready");
        Ok(registry)
    }

    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.id.clone(), Arc::new(entry));
    }

    pub fn get(&self, id: &str) -> Result<Arc<Entry>, RegistryError> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::EntryNotFound(id.to_string()))
    }

    pub fn first(&self) -> Option<Arc<Entry>> {
        self.entries.values().next().cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Named entry, or the first one when the id is absent or unknown
    pub fn resolve(&self, entry_id: Option<&str>) -> Result<Arc<Entry>, RegistryError> {
        if let Some(id) = entry_id.filter(|id| !id.is_empty()) {
            if let Some(entry) = self.entries.get(id) {
                return Ok(entry.clone());
            }
            warn!(entry_id = %id, "Unknown entry, falling back to the first entry");
        }
        self.first().ok_or(RegistryError::NoEntries)
    }

    /// Entry and concrete page request for an on-demand trigger
    pub fn resolve_trigger(
        &self,
        trigger: &FetchTrigger,
    ) -> Result<(Arc<Entry>, FetchRequest), RegistryError> {
        let entry = self.resolve(trigger.entry_id.as_deref())?;

        let camera_id = trigger
            .camera_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| entry.camera_id())
            .ok_or_else(|| RegistryError::CameraUnresolved {
                entry_id: entry.id.clone(),
            })?
            .to_string();

        let limit = trigger.limit.unwrap_or(entry.config.default_limit);
        if !LIMIT_RANGE.contains(&limit) {
            return Err(RegistryError::InvalidLimit(limit));
        }

        let request = FetchRequest::builder()
            .camera_id(camera_id)
            .offset(trigger.offset)
            .limit(limit)
            .wildlife_required(trigger.wildlife_required)
            .build();

        Ok((entry, request))
    }
}
