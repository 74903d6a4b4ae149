//! Optional time-series sink for committed detections
//!
//! Writes are best-effort: each detection is written on its own and a failed
//! write never affects the others or the fetch cycle.

mod influx;

pub use influx::{InfluxSink, InfluxTarget};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::detection::Detection;
use crate::error::SinkError;

/// Measurement name every detection is written under
pub const MEASUREMENT: &str = "molnus_image";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

/// A tagged, timestamped time-series point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// `molnus_image,camera_id=..,species=.. accuracy=..  <captured_at>`
    pub fn from_detection(detection: &Detection, camera_id: &str) -> Self {
        Point::new(MEASUREMENT)
            .tag("species", detection.label.as_str())
            .tag("camera_id", camera_id)
            .field("accuracy", FieldValue::Float(detection.accuracy))
            .at(detection.captured_at)
    }
}

/// Destination for points
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Counts from one best-effort dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub written: usize,
    pub failed: usize,
}

/// Maps detections to points and fans them out to a [`PointSink`]
#[derive(Clone)]
pub struct DetectionSink {
    inner: Arc<dyn PointSink>,
}

impl DetectionSink {
    pub fn new(inner: Arc<dyn PointSink>) -> Self {
        Self { inner }
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    pub async fn write(&self, detection: &Detection, camera_id: &str) -> Result<(), SinkError> {
        let point = Point::from_detection(detection, camera_id);
        self.inner.write_point(&point).await
    }

    /// Write every detection independently; failures are logged and counted
    pub async fn dispatch(&self, detections: &[Detection]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for detection in detections {
            match self.write(detection, &detection.camera_id).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        sink = %self.inner.describe(),
                        camera_id = %detection.camera_id,
                        label = %detection.label,
                        captured_at = %detection.captured_at,
                        error = %e,
                        "Sink write failed"
                    );
                }
            }
        }

        debug!(written = report.written, failed = report.failed, "Sink dispatch finished");
        report
    }
}

/// In-memory sink for development and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Mutex<Vec<Point>>,
    fail_species: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every point tagged with this species
    pub fn fail_species(&self, species: impl Into<String>) {
        if let Ok(mut guard) = self.fail_species.lock() {
            *guard = Some(species.into());
        }
    }

    pub fn points(&self) -> Vec<Point> {
        self.points
            .lock()
            .map(|points| points.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PointSink for MemorySink {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        let failing = self
            .fail_species
            .lock()
            .ok()
            .and_then(|guard| guard.clone());

        if failing.is_some() && point.tags.get("species") == failing.as_ref() {
            return Err(SinkError::Rejected {
                status: 500,
                body: "rejected by memory sink".to_string(),
            });
        }

        if let Ok(mut points) = self.points.lock() {
            points.push(point.clone());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
