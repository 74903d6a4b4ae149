//! API models for the trigger and presentation endpoints
//!
//! - `POST /services/fetch_images` accepts a [`FetchTrigger`](crate::registry::FetchTrigger)
//!   and returns [`FetchResponse`]
//! - `GET /entries` returns [`EntrySummary`] per configured entry
//! - `GET /entries/{id}/labels[/{label}]` returns [`LabelView`]s
//!
//! A label view as JSON:
//!
//! ```json
//! {
//!   "label": "CAPREOLUS",
//!   "readable_name": "Roe deer (Capreolus capreolus)",
//!   "state": 1,
//!   "present": true,
//!   "history": [
//!     {
//!       "captured_at": "2025-03-01T06:30:00Z",
//!       "image_url": "https://.../image.jpg",
//!       "label": "CAPREOLUS",
//!       "accuracy": 0.75,
//!       "camera_id": "cam-1"
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::coordinator::{CyclePhase, CycleResult, CycleSummary};
use crate::detection::{Detection, Label};
use crate::history::LabelState;
use crate::registry::Entry;

#[derive(Debug, Serialize, Clone)]
pub struct FetchResponse {
    pub entry_id: String,
    pub camera_id: String,
    pub result: CycleResult,
}

#[derive(Debug, Serialize, Clone)]
pub struct EntrySummary {
    pub entry_id: String,
    pub camera_id: Option<String>,
    pub phase: CyclePhase,
    pub fetch_interval_secs: u64,
    pub sink: Option<String>,
    pub detections: usize,
    pub present_labels: Vec<Label>,
    pub last_cycle: Option<CycleSummary>,
}

impl EntrySummary {
    pub fn from_entry(entry: &Entry) -> Self {
        let coordinator = entry.coordinator();
        let store = coordinator.snapshot();

        Self {
            entry_id: entry.id().to_string(),
            camera_id: entry.camera_id().map(str::to_string),
            phase: coordinator.phase(),
            fetch_interval_secs: entry.config().fetch_interval().as_secs(),
            sink: coordinator.sink().map(|sink| sink.describe()),
            detections: store.total_detections(),
            present_labels: store.present_labels().into_iter().collect(),
            last_cycle: coordinator.last_cycle(),
        }
    }
}

/// One label as a binary presence flag plus its history
#[derive(Debug, Serialize, Clone)]
pub struct LabelView {
    pub label: Label,
    pub readable_name: Option<&'static str>,
    /// 1 if seen in the most recent cycle, else 0
    pub state: u8,
    pub present: bool,
    pub history: Vec<Detection>,
}

impl From<&LabelState> for LabelView {
    fn from(state: &LabelState) -> Self {
        Self {
            label: state.label.clone(),
            readable_name: state.label.readable_name(),
            state: u8::from(state.present),
            present: state.present,
            history: state.history.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct LabelsResponse {
    pub entry_id: String,
    pub labels: Vec<LabelView>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub entries: usize,
    pub version: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
