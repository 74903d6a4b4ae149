//! Observability (counters, tracing setup)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Process-wide cycle counters
#[derive(Debug, Default)]
pub struct Metrics {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_rejected: AtomicU64,
    records_skipped: AtomicU64,
    sink_writes: AtomicU64,
    sink_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cycles_started", "Metric incremented");
    }

    pub fn cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cycles_completed", "Metric incremented");
    }

    pub fn cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cycles_failed", "Metric incremented");
    }

    /// Trigger refused because a cycle was already running
    pub fn cycle_rejected(&self) {
        self.cycles_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cycles_rejected", "Metric incremented");
    }

    pub fn records_skipped(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.records_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn sink_results(&self, written: u64, failed: u64) {
        self.sink_writes.fetch_add(written, Ordering::Relaxed);
        self.sink_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_rejected: self.cycles_rejected.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            sink_writes: self.sink_writes.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_rejected: u64,
    pub records_skipped: u64,
    pub sink_writes: u64,
    pub sink_failures: u64,
}
