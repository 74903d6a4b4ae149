//! Fetch cycle orchestration for one entry
//!
//! A cycle runs `Idle -> Fetching -> Normalizing -> Committing -> Idle`, or
//! passes through `Failed` on error. Timer and on-demand triggers share the
//! same entry slot; a trigger arriving while a cycle runs is rejected with
//! [`FetchError::ConcurrentCycle`] and never queued.

mod guard;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::client::{FetchRequest, ImageSource, RawDetectionRecord};
use crate::detection::{Detection, Label};
use crate::error::{ErrorKind, FetchError};
use crate::history::{DEFAULT_HISTORY_CAP, HistoryStore};
use crate::normalizer::normalize_with_warnings;
use crate::observability::Metrics;
use crate::sink::DetectionSink;

use guard::CycleGuard;

pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CyclePhase {
    Idle = 0,
    Fetching = 1,
    Normalizing = 2,
    Committing = 3,
    Failed = 4,
}

impl CyclePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CyclePhase::Fetching,
            2 => CyclePhase::Normalizing,
            3 => CyclePhase::Committing,
            4 => CyclePhase::Failed,
            _ => CyclePhase::Idle,
        }
    }
}

#[derive(Debug, Clone, Builder)]
pub struct CoordinatorOptions {
    /// Watchdog for the whole fetch stage
    #[builder(default = DEFAULT_CYCLE_TIMEOUT)]
    pub cycle_timeout: Duration,
    /// Pages followed while the server reports more
    #[builder(default = 1)]
    pub max_pages: u32,
    #[builder(default = DEFAULT_HISTORY_CAP)]
    pub history_cap: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Outcome of a successful cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    pub labels_present: BTreeSet<Label>,
    /// Detections in this cycle's batch
    pub detection_count: usize,
    /// Of those, how many were not already in history
    pub new_detections: usize,
    pub records_fetched: usize,
    pub records_skipped: usize,
    pub sink_writes: usize,
    pub sink_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Succeeded { result: CycleResult },
    Failed { kind: ErrorKind, message: String },
}

/// Diagnostics kept for the most recent finished cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub camera_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

pub struct FetchCoordinator {
    entry_id: String,
    source: Arc<dyn ImageSource>,
    sink: Option<DetectionSink>,
    options: CoordinatorOptions,
    metrics: Arc<Metrics>,
    store: RwLock<Arc<HistoryStore>>,
    running: AtomicBool,
    phase: AtomicU8,
    last_cycle: Mutex<Option<CycleSummary>>,
}

impl FetchCoordinator {
    pub fn new(
        entry_id: impl Into<String>,
        source: Arc<dyn ImageSource>,
        options: CoordinatorOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let store = HistoryStore::new(options.history_cap);

        Self {
            entry_id: entry_id.into(),
            source,
            sink: None,
            options,
            metrics,
            store: RwLock::new(Arc::new(store)),
            running: AtomicBool::new(false),
            phase: AtomicU8::new(CyclePhase::Idle as u8),
            last_cycle: Mutex::new(None),
        }
    }

    pub fn with_sink(mut self, sink: DetectionSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    pub fn sink(&self) -> Option<&DetectionSink> {
        self.sink.as_ref()
    }

    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Last published history; never a partially applied cycle
    pub fn snapshot(&self) -> Arc<HistoryStore> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one fetch cycle, or reject immediately if one is in flight
    pub async fn run_cycle(&self, request: FetchRequest) -> Result<CycleResult, FetchError> {
        let Some(guard) = CycleGuard::try_acquire(&self.running, &self.phase) else {
            self.metrics.cycle_rejected();
            warn!(
                entry_id = %self.entry_id,
                camera_id = %request.camera_id,
                "Fetch already in progress, trigger rejected"
            );
            return Err(FetchError::ConcurrentCycle {
                entry_id: self.entry_id.clone(),
            });
        };

        let cycle_id = Uuid::now_v7();
        let started_at = Utc::now();
        let span = info_span!(
            "cycle",
            entry_id = %self.entry_id,
            camera_id = %request.camera_id,
            %cycle_id
        );

        self.metrics.cycle_started();
        let result = self.execute(&guard, &request).instrument(span.clone()).await;

        let outcome = match &result {
            Ok(result) => {
                self.metrics.cycle_completed();
                span.in_scope(|| {
                    info!(
                        labels_present = ?result.labels_present,
                        detections = result.detection_count,
                        new = result.new_detections,
                        skipped = result.records_skipped,
                        "Fetch cycle completed"
                    )
                });
                CycleOutcome::Succeeded {
                    result: result.clone(),
                }
            }
            Err(e) => {
                guard.set_phase(CyclePhase::Failed);
                self.metrics.cycle_failed();
                span.in_scope(|| warn!(kind = ?e.kind(), error = %e, "Fetch cycle failed"));
                CycleOutcome::Failed {
                    kind: e.kind(),
                    message: e.user_message(),
                }
            }
        };

        *self.last_cycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(CycleSummary {
            cycle_id,
            camera_id: request.camera_id.clone(),
            started_at,
            finished_at: Utc::now(),
            outcome,
        });

        drop(guard);
        result
    }

    async fn execute(
        &self,
        guard: &CycleGuard<'_>,
        request: &FetchRequest,
    ) -> Result<CycleResult, FetchError> {
        guard.set_phase(CyclePhase::Fetching);
        let records = tokio::time::timeout(self.options.cycle_timeout, self.fetch_records(request))
            .await
            .map_err(|_| {
                FetchError::Network(format!(
                    "fetch did not finish within {}s",
                    self.options.cycle_timeout.as_secs_f64()
                ))
            })??;

        guard.set_phase(CyclePhase::Normalizing);
        let batch = normalize_batch(&records, &request.camera_id);
        let records_skipped = records.len() - batch.len();
        self.metrics.records_skipped(records_skipped as u64);

        guard.set_phase(CyclePhase::Committing);
        let mut next = HistoryStore::clone(&self.snapshot());
        let outcome = next.commit(&request.camera_id, &batch);
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        let mut result = CycleResult {
            labels_present: outcome.labels_present,
            detection_count: batch.len(),
            new_detections: outcome.inserted,
            records_fetched: records.len(),
            records_skipped,
            ..CycleResult::default()
        };

        if let Some(sink) = &self.sink {
            let report = sink.dispatch(&batch).await;
            self.metrics
                .sink_results(report.written as u64, report.failed as u64);
            result.sink_writes = report.written;
            result.sink_failures = report.failed;
        }

        Ok(result)
    }

    async fn fetch_records(
        &self,
        request: &FetchRequest,
    ) -> Result<Vec<RawDetectionRecord>, FetchError> {
        let mut records = Vec::new();
        let mut page_request = request.clone();

        for page_no in 1..=self.options.max_pages.max(1) {
            let page = self.source.fetch_page(&page_request).await?;
            let received = page.records.len();
            records.extend(page.records);

            debug!(page = page_no, received, has_more = page.has_more, "Fetched page");
            if !page.has_more || received == 0 {
                break;
            }
            page_request = page_request.next_page();
        }

        Ok(records)
    }
}

fn normalize_batch(records: &[RawDetectionRecord], camera_id: &str) -> Vec<Detection> {
    records
        .iter()
        .filter_map(|record| {
            let normalized = normalize_with_warnings(record, camera_id);
            for warning in &normalized.warnings {
                if warning.is_fatal() || normalized.detection.is_none() {
                    warn!(%warning, "Skipping record");
                } else {
                    debug!(%warning, "Record accepted with warning");
                }
            }
            normalized.detection
        })
        .collect()
}
