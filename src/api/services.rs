use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use super::{
    models::{EntrySummary, FetchResponse, HealthResponse, LabelView, LabelsResponse},
    state::AppState,
    utils::{parse_label, parse_trigger},
};
use crate::api::error::ApiError;
use crate::scheduler::stopped;

/// On-demand fetch (POST /services/fetch_images)
///
/// Body fields are all optional: `entry_id` (first entry when absent or unknown),
/// `camera_id` (entry default when absent), `offset`, `limit`,
/// `wildlife_required`. Runs the cycle inline and answers with its result.
/// A cycle already in flight for the entry yields 409 without any call to
/// Molnus. A shutdown arriving mid-cycle abandons it and answers 503.
pub async fn fetch_images(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let trigger = parse_trigger(&body)?;
    let (entry, request) = state.registry.resolve_trigger(&trigger)?;

    info!(
        entry_id = %entry.id(),
        camera_id = %request.camera_id,
        offset = request.offset,
        limit = request.limit,
        "On-demand fetch requested"
    );

    let camera_id = request.camera_id.clone();
    let result = tokio::select! {
        result = entry.coordinator().run_cycle(request) => result?,
        _ = stopped(state.shutdown.clone()) => {
            warn!(entry_id = %entry.id(), "Shutting down, on-demand cycle abandoned");
            return Err(ApiError::ShuttingDown);
        }
    };

    Ok((
        StatusCode::OK,
        Json(FetchResponse {
            entry_id: entry.id().to_string(),
            camera_id,
            result,
        }),
    ))
}

/// Configured entries with phase and last cycle (GET /entries)
pub async fn list_entries(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<EntrySummary> = state
        .registry
        .iter()
        .map(|entry| EntrySummary::from_entry(entry))
        .collect();

    Json(entries)
}

/// Every label of an entry (GET /entries/{entry_id}/labels)
pub async fn list_labels(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.registry.get(&entry_id)?;
    let store = entry.coordinator().snapshot();

    Ok(Json(LabelsResponse {
        entry_id,
        labels: store.labels().map(LabelView::from).collect(),
    }))
}

/// One label of an entry (GET /entries/{entry_id}/labels/{label})
pub async fn get_label(
    State(state): State<AppState>,
    Path((entry_id, label)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.registry.get(&entry_id)?;
    let label = parse_label(&label)?;
    let store = entry.coordinator().snapshot();

    let view = store
        .get(&label)
        .map(LabelView::from)
        .ok_or_else(|| ApiError::NotFound(format!("label {label} on entry {entry_id}")))?;

    Ok(Json(view))
}

/// Counter snapshot (GET /operators/metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Health check endpoint (GET /health)
///
/// The bridge holds no external connections between cycles, so being able
/// to answer means healthy. Upstream trouble shows up per entry in
/// `GET /entries` instead.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        entries: state.registry.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}
