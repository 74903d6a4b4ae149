//! Per-label bounded detection history
//!
//! A [`HistoryStore`] belongs to one configured entry. The coordinator commits
//! a whole cycle to a private copy and publishes it in one swap, so readers
//! never see a half-applied batch.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::detection::{Detection, Label};

/// Retained detections per label unless configured otherwise
pub const DEFAULT_HISTORY_CAP: usize = 500;

/// History and presence flag for one label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelState {
    pub label: Label,
    /// Seen in the most recent committed cycle
    pub present: bool,
    /// Newest first
    pub history: VecDeque<Detection>,
}

impl LabelState {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            present: false,
            history: VecDeque::new(),
        }
    }

    /// Insert in recency order unless the identity key is already held.
    ///
    /// Returns whether the detection was added. O(cap).
    fn insert(&mut self, detection: Detection, cap: usize) -> bool {
        let key = detection.key();
        if self.history.iter().any(|existing| existing.has_key(&key)) {
            return false;
        }

        let position = self
            .history
            .iter()
            .position(|existing| existing.captured_at <= detection.captured_at)
            .unwrap_or(self.history.len());

        if position >= cap {
            return false;
        }

        self.history.insert(position, detection);
        self.history.truncate(cap);
        true
    }
}

/// What a commit changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub labels_present: BTreeSet<Label>,
    pub inserted: usize,
}

/// All label states for one entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStore {
    cap: usize,
    labels: BTreeMap<Label, LabelState>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl HistoryStore {
    /// Store pre-populated with every known label, all absent
    pub fn new(cap: usize) -> Self {
        let labels = Label::known()
            .map(|label| (label.clone(), LabelState::new(label)))
            .collect();

        Self {
            cap: cap.max(1),
            labels,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Apply one cycle's batch and return the labels present in it
    pub fn record_cycle(&mut self, camera_id: &str, detections: &[Detection]) -> BTreeSet<Label> {
        self.commit(camera_id, detections).labels_present
    }

    /// Like [`record_cycle`](Self::record_cycle), also reporting how many entries were new
    ///
    /// `camera_id` is the camera the cycle was run for. It is stored on every
    /// detection and so takes part in the identity key.
    pub fn commit(&mut self, camera_id: &str, detections: &[Detection]) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();

        for detection in detections {
            let mut detection = detection.clone();
            if detection.camera_id != camera_id {
                detection.camera_id = camera_id.to_string();
            }

            let state = self
                .labels
                .entry(detection.label.clone())
                .or_insert_with(|| LabelState::new(detection.label.clone()));

            outcome.labels_present.insert(detection.label.clone());
            if state.insert(detection, self.cap) {
                outcome.inserted += 1;
            }
        }

        for (label, state) in self.labels.iter_mut() {
            state.present = outcome.labels_present.contains(label);
        }

        outcome
    }

    pub fn get(&self, label: &Label) -> Option<&LabelState> {
        self.labels.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &LabelState> {
        self.labels.values()
    }

    pub fn present_labels(&self) -> BTreeSet<Label> {
        self.labels
            .values()
            .filter(|state| state.present)
            .map(|state| state.label.clone())
            .collect()
    }

    pub fn total_detections(&self) -> usize {
        self.labels.values().map(|state| state.history.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn detection(label: &str, minute: i64, url: &str) -> Detection {
        Detection {
            captured_at: Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            image_url: url.to_string(),
            label: Label::new(label),
            accuracy: 0.8,
            camera_id: "cam1".to_string(),
        }
    }

    fn assert_newest_first(state: &LabelState) {
        let ordered = state
            .history
            .iter()
            .zip(state.history.iter().skip(1))
            .all(|(newer, older)| newer.captured_at >= older.captured_at);
        assert!(ordered, "history out of order for {}", state.label);
    }

    #[test]
    fn test_new_store_has_known_labels() {
        let store = HistoryStore::default();
        assert_eq!(store.cap(), DEFAULT_HISTORY_CAP);
        assert_eq!(store.labels().count(), Label::known().count());
        assert!(store.labels().all(|s| !s.present && s.history.is_empty()));
    }

    #[test]
    fn test_cap_and_order_hold() {
        let mut store = HistoryStore::new(5);

        // out-of-order minutes across several cycles
        let minutes = [7, 3, 9, 1, 12, 5, 8, 2, 15, 4, 11];
        for chunk in minutes.chunks(3) {
            let batch: Vec<_> = chunk
                .iter()
                .map(|m| detection("ALCES", *m, &format!("u{m}")))
                .collect();
            store.record_cycle("cam1", &batch);

            let state = store.get(&Label::new("ALCES")).unwrap();
            assert!(state.history.len() <= 5);
            assert_newest_first(state);
        }

        let state = store.get(&Label::new("ALCES")).unwrap();
        let kept: Vec<_> = state
            .history
            .iter()
            .map(|d| d.image_url.as_str())
            .collect();
        assert_eq!(kept, vec!["u15", "u12", "u11", "u9", "u8"]);
    }

    #[test]
    fn test_duplicate_key_not_inserted() {
        let mut store = HistoryStore::default();
        let d = detection("MELES", 1, "u1");

        let first = store.commit("cam1", &[d.clone()]);
        assert_eq!(first.inserted, 1);

        let mut same_key = d.clone();
        same_key.accuracy = 0.1;
        let second = store.commit("cam1", &[same_key, d.clone()]);
        assert_eq!(second.inserted, 0);
        assert_eq!(store.get(&Label::new("MELES")).unwrap().history.len(), 1);
    }

    #[test]
    fn test_presence_flags() {
        let mut store = HistoryStore::default();
        store.record_cycle("cam1", &[detection("CAPREOLUS", 1, "u1")]);
        assert!(store.get(&Label::new("CAPREOLUS")).unwrap().present);

        // already-seen detection still marks presence
        let present = store.record_cycle(
            "cam1",
            &[detection("CAPREOLUS", 1, "u1"), detection("ALCES", 2, "u2")],
        );
        assert_eq!(
            present,
            BTreeSet::from([Label::new("ALCES"), Label::new("CAPREOLUS")])
        );

        // empty cycle clears all flags
        let present = store.record_cycle("cam1", &[]);
        assert!(present.is_empty());
        assert!(store.labels().all(|s| !s.present));
        assert_eq!(store.total_detections(), 2);
    }

    #[test]
    fn test_unknown_label_gets_state() {
        let mut store = HistoryStore::default();
        store.record_cycle("cam1", &[detection("VULPES", 1, "u1")]);

        let state = store.get(&Label::new("VULPES")).unwrap();
        assert!(state.present);
        assert_eq!(state.history.len(), 1);
        assert_eq!(store.present_labels(), BTreeSet::from([Label::new("VULPES")]));
    }

    #[test]
    fn test_old_detection_dropped_when_full() {
        let mut store = HistoryStore::new(2);
        store.record_cycle(
            "cam1",
            &[detection("ALCES", 10, "a"), detection("ALCES", 11, "b")],
        );

        let outcome = store.commit("cam1", &[detection("ALCES", 1, "old")]);
        assert_eq!(outcome.inserted, 0);
        // still counts as present this cycle
        assert!(outcome.labels_present.contains(&Label::new("ALCES")));
        assert_eq!(store.get(&Label::new("ALCES")).unwrap().history.len(), 2);
    }

    #[test]
    fn test_cycle_camera_owns_identity() {
        let mut store = HistoryStore::default();
        store.record_cycle("cam1", &[detection("DAMA_DAMA", 1, "u1")]);

        // a record tagged with another camera is filed under the cycle's camera
        let mut foreign = detection("DAMA_DAMA", 1, "u1");
        foreign.camera_id = "cam2".to_string();
        let outcome = store.commit("cam1", &[foreign.clone()]);
        assert_eq!(outcome.inserted, 0);

        let outcome = store.commit("cam2", &[foreign]);
        assert_eq!(outcome.inserted, 1);

        let cameras: Vec<_> = store
            .get(&Label::new("DAMA_DAMA"))
            .unwrap()
            .history
            .iter()
            .map(|d| d.camera_id.as_str())
            .collect();
        assert_eq!(cameras, vec!["cam2", "cam1"]);
    }
}
