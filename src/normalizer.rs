//! Raw Molnus image record -> canonical [`Detection`]
//!
//! All tolerance for missing or malformed upstream fields lives here. The
//! functions are pure: warnings are returned, never logged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::client::RawDetectionRecord;
use crate::detection::{Detection, Label};
use crate::error::DataQualityWarning;

/// Typed, all-optional view over a raw record
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImageRecord {
    #[serde(rename = "captureDate")]
    capture_date: Option<String>,
    url: Option<String>,
    #[serde(rename = "ImagePredictions", alias = "predictions")]
    predictions: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Prediction {
    label: Option<String>,
    accuracy: Option<f64>,
}

/// Result of normalizing one record
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub detection: Option<Detection>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Normalize a record, dropping it when it cannot yield a detection
pub fn normalize(raw: &RawDetectionRecord, camera_id: &str) -> Option<Detection> {
    normalize_with_warnings(raw, camera_id).detection
}

/// Normalize a record and report every data-quality issue found
pub fn normalize_with_warnings(raw: &RawDetectionRecord, camera_id: &str) -> Normalized {
    let mut warnings = Vec::new();

    let record: ImageRecord = match ImageRecord::deserialize(raw.as_value()) {
        Ok(record) => record,
        Err(e) => {
            warnings.push(DataQualityWarning::MalformedRecord(e.to_string()));
            return Normalized {
                detection: None,
                warnings,
            };
        }
    };

    let captured_at = match record.capture_date.as_deref() {
        None | Some("") => {
            warnings.push(DataQualityWarning::MissingTimestamp);
            None
        }
        Some(raw_ts) => {
            let parsed = parse_capture_date(raw_ts);
            if parsed.is_none() {
                warnings.push(DataQualityWarning::UnparsableTimestamp(raw_ts.to_string()));
            }
            parsed
        }
    };

    let best = best_prediction(record.predictions.as_deref().unwrap_or_default());
    if best.is_none() {
        warnings.push(DataQualityWarning::NoPredictions);
    }

    let (Some(captured_at), Some((label, raw_accuracy))) = (captured_at, best) else {
        return Normalized {
            detection: None,
            warnings,
        };
    };

    let accuracy = if (0.0..=1.0).contains(&raw_accuracy) {
        raw_accuracy
    } else {
        warnings.push(DataQualityWarning::AccuracyOutOfRange {
            label: label.clone(),
            value: raw_accuracy,
        });
        raw_accuracy.clamp(0.0, 1.0)
    };

    let image_url = match record.url {
        Some(url) if !url.is_empty() => url,
        _ => {
            warnings.push(DataQualityWarning::MissingImageUrl);
            String::new()
        }
    };

    Normalized {
        detection: Some(Detection {
            captured_at,
            image_url,
            label: Label::new(label),
            accuracy,
            camera_id: camera_id.to_string(),
        }),
        warnings,
    }
}

/// Parse a Molnus `captureDate`
///
/// RFC 3339 first (a trailing `Z` is fine), then ISO datetimes with a compact
/// `+0000` offset, then naive datetimes or bare dates taken as UTC. Seconds
/// and fractions are optional.
pub fn parse_capture_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let with_offset = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok());
    if let Some(dt) = with_offset {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = raw.trim_end_matches('Z');
    let datetime = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(naive, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })?;

    Some(datetime.and_utc())
}

/// Highest-accuracy labelled prediction; missing or NaN accuracy ranks lowest (as 0.0)
fn best_prediction(predictions: &[Value]) -> Option<(String, f64)> {
    predictions
        .iter()
        .filter_map(|value| Prediction::deserialize(value).ok())
        .filter_map(|p| {
            let label = p.label.filter(|l| !l.is_empty())?;
            let rank = p.accuracy.filter(|a| !a.is_nan());
            Some((label, rank))
        })
        .fold(None, |best: Option<(String, Option<f64>)>, candidate| match best {
            Some(current) if rank_of(current.1) >= rank_of(candidate.1) => Some(current),
            _ => Some(candidate),
        })
        .map(|(label, accuracy)| (label, accuracy.unwrap_or(0.0)))
}

fn rank_of(accuracy: Option<f64>) -> f64 {
    accuracy.unwrap_or(f64::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: Value) -> RawDetectionRecord {
        RawDetectionRecord::new(value)
    }

    #[test]
    fn test_picks_highest_accuracy() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "https://molnus.com/img/1.jpg",
            "ImagePredictions": [
                {"label": "A", "accuracy": 0.2},
                {"label": "B", "accuracy": 0.9}
            ]
        }));

        let detection = normalize(&record, "cam1").unwrap();
        assert_eq!(detection.label.as_str(), "B");
        assert_eq!(detection.accuracy, 0.9);
        assert_eq!(detection.camera_id, "cam1");
        assert_eq!(
            detection.captured_at,
            Utc.with_ymd_and_hms(2025, 5, 1, 4, 12, 0).unwrap()
        );
    }

    #[test]
    fn test_empty_predictions_is_dropped() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "https://molnus.com/img/1.jpg",
            "ImagePredictions": []
        }));

        let result = normalize_with_warnings(&record, "cam1");
        assert!(result.detection.is_none());
        assert_eq!(result.warnings, vec![DataQualityWarning::NoPredictions]);
    }

    #[test]
    fn test_predictions_alias() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "u",
            "predictions": [{"label": "MELES", "accuracy": 0.4}]
        }));

        assert_eq!(normalize(&record, "c").unwrap().label.as_str(), "MELES");
    }

    #[test]
    fn test_unparsable_timestamp_is_dropped() {
        let record = raw(json!({
            "captureDate": "yesterday at noon",
            "url": "u",
            "ImagePredictions": [{"label": "ALCES", "accuracy": 0.8}]
        }));

        let result = normalize_with_warnings(&record, "cam1");
        assert!(result.detection.is_none());
        assert!(matches!(
            result.warnings[0],
            DataQualityWarning::UnparsableTimestamp(_)
        ));
    }

    #[test]
    fn test_missing_timestamp_is_dropped() {
        let record = raw(json!({
            "url": "u",
            "ImagePredictions": [{"label": "ALCES", "accuracy": 0.8}]
        }));

        let result = normalize_with_warnings(&record, "cam1");
        assert!(result.detection.is_none());
        assert_eq!(result.warnings, vec![DataQualityWarning::MissingTimestamp]);
    }

    #[test]
    fn test_naive_timestamp_assumed_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_capture_date("2025-01-02T03:04:05"), Some(expected));
        assert_eq!(
            parse_capture_date("2025-01-02T03:04:05.250").map(|d| d.timestamp()),
            Some(expected.timestamp())
        );
        assert_eq!(parse_capture_date("2025-01-02T05:04:05+02:00"), Some(expected));
        assert_eq!(parse_capture_date("not a date"), None);
    }

    #[test]
    fn test_loose_iso_forms() {
        let at = |h, m| Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap();

        assert_eq!(parse_capture_date("2025-03-01T06:30"), Some(at(6, 30)));
        assert_eq!(parse_capture_date("2025-03-01 06:30"), Some(at(6, 30)));
        assert_eq!(parse_capture_date("2025-03-01"), Some(at(0, 0)));
        assert_eq!(parse_capture_date("2025-03-01T08:30:00+0200"), Some(at(6, 30)));
        assert_eq!(parse_capture_date("2025-03-01T06:30:00+0000"), Some(at(6, 30)));
        assert_eq!(parse_capture_date("2025-03-01T06:30+0000"), Some(at(6, 30)));
        assert_eq!(parse_capture_date("2025-13-01"), None);
    }

    #[test]
    fn test_accuracy_clamped_with_warning() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "u",
            "ImagePredictions": [{"label": "SUS_SCROFA", "accuracy": 87.0}]
        }));

        let result = normalize_with_warnings(&record, "cam1");
        assert_eq!(result.detection.unwrap().accuracy, 1.0);
        assert!(matches!(
            result.warnings[0],
            DataQualityWarning::AccuracyOutOfRange { .. }
        ));
    }

    #[test]
    fn test_unlabelled_and_missing_accuracy() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "u",
            "ImagePredictions": [
                {"label": null, "accuracy": 0.99},
                {"label": "DAMA_DAMA"},
                {"label": "MELES", "accuracy": 0.1}
            ]
        }));

        let detection = normalize(&record, "c").unwrap();
        assert_eq!(detection.label.as_str(), "MELES");

        let only_missing = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "u",
            "ImagePredictions": [{"label": "DAMA_DAMA"}]
        }));
        let detection = normalize(&only_missing, "c").unwrap();
        assert_eq!(detection.label.as_str(), "DAMA_DAMA");
        assert_eq!(detection.accuracy, 0.0);
    }

    #[test]
    fn test_ties_keep_first() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "url": "u",
            "ImagePredictions": [
                {"label": "ALCES", "accuracy": 0.5},
                {"label": "MELES", "accuracy": 0.5}
            ]
        }));

        assert_eq!(normalize(&record, "c").unwrap().label.as_str(), "ALCES");
    }

    #[test]
    fn test_malformed_record() {
        let result = normalize_with_warnings(&raw(json!("just a string")), "c");
        assert!(result.detection.is_none());
        assert!(matches!(
            result.warnings[0],
            DataQualityWarning::MalformedRecord(_)
        ));

        let wrong_types = raw(json!({"captureDate": 12, "ImagePredictions": "x"}));
        assert!(normalize(&wrong_types, "c").is_none());
    }

    #[test]
    fn test_missing_url_kept_with_warning() {
        let record = raw(json!({
            "captureDate": "2025-05-01T04:12:00Z",
            "ImagePredictions": [{"label": "ALCES", "accuracy": 0.7}]
        }));

        let result = normalize_with_warnings(&record, "c");
        assert_eq!(result.detection.unwrap().image_url, "");
        assert_eq!(result.warnings, vec![DataQualityWarning::MissingImageUrl]);
    }
}
