//! Printer status, monitoring control and job history routes.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::database::models::JobRecord;
use crate::telemetry::DeviceSnapshot;

const DEFAULT_JOB_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(all_status))
        .route("/{device_id}/status", get(device_status))
        .route(
            "/{device_id}/monitor",
            post(start_monitoring).delete(stop_monitoring),
        )
        .route("/{device_id}/jobs", get(recent_jobs))
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub device_id: String,
    pub monitoring: bool,
    /// Whether this request changed anything.
    pub changed: bool,
}

/// Latest snapshot of every device, keyed by device id.
async fn all_status(State(state): State<AppState>) -> Json<BTreeMap<String, DeviceSnapshot>> {
    Json(
        state
            .monitor
            .get_all_latest_snapshots()
            .into_iter()
            .collect(),
    )
}

async fn device_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceSnapshot>> {
    state
        .monitor
        .get_latest_snapshot(&device_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No status for printer '{}'", device_id)))
}

async fn start_monitoring(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<MonitorResponse>> {
    let changed = state.monitor.start_monitoring(&device_id).await?;
    Ok(Json(MonitorResponse {
        device_id,
        monitoring: true,
        changed,
    }))
}

async fn stop_monitoring(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Json<MonitorResponse> {
    let changed = state.monitor.stop_monitoring(&device_id).await;
    Json(MonitorResponse {
        device_id,
        monitoring: false,
        changed,
    })
}

async fn recent_jobs(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIMIT);
    let records = state
        .job_history
        .list_recent(Some(&device_id), limit)
        .await?;
    Ok(Json(records))
}
