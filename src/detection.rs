//! Canonical detection types shared by the normalizer, history and sink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Species labels Molnus is known to emit, with a readable name
pub const KNOWN_LABELS: &[(&str, &str)] = &[
    ("CAPREOLUS", "Roe deer (Capreolus capreolus)"),
    ("CERVUS_ELAPHUS", "Red deer (Cervus elaphus)"),
    ("SUS_SCROFA", "Wild boar (Sus scrofa)"),
    ("DAMA_DAMA", "Fallow deer (Dama dama)"),
    ("MELES", "Badger (Meles meles)"),
    ("ALCES", "Moose (Alces alces)"),
];

/// Classification label assigned to a detection
///
/// Unknown labels are kept verbatim; Molnus adds species over time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn readable_name(&self) -> Option<&'static str> {
        KNOWN_LABELS
            .iter()
            .find(|(label, _)| *label == self.0)
            .map(|(_, name)| *name)
    }

    pub fn is_known(&self) -> bool {
        self.readable_name().is_some()
    }

    pub fn known() -> impl Iterator<Item = Label> {
        KNOWN_LABELS.iter().map(|(label, _)| Label::new(*label))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One normalized image-analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub captured_at: DateTime<Utc>,
    pub image_url: String,
    pub label: Label,
    pub accuracy: f64,
    pub camera_id: String,
}

/// Stable identity used for dedupe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetectionKey {
    pub camera_id: String,
    pub captured_at: DateTime<Utc>,
    pub image_url: String,
}

impl Detection {
    pub fn key(&self) -> DetectionKey {
        DetectionKey {
            camera_id: self.camera_id.clone(),
            captured_at: self.captured_at,
            image_url: self.image_url.clone(),
        }
    }

    pub fn has_key(&self, key: &DetectionKey) -> bool {
        self.captured_at == key.captured_at
            && self.camera_id == key.camera_id
            && self.image_url == key.image_url
    }
}
