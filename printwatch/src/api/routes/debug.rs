//! Snapshot injection for exercising the live dashboard without a printer.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::telemetry::DeviceSnapshot;

pub fn router() -> Router<AppState> {
    Router::new().route("/snapshot", post(inject_snapshot))
}

#[derive(Debug, Deserialize)]
pub struct InjectSnapshotRequest {
    pub device_id: String,
    pub state: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub eta_minutes: Option<i64>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

async fn inject_snapshot(
    State(state): State<AppState>,
    Json(request): Json<InjectSnapshotRequest>,
) -> ApiResult<StatusCode> {
    if request.device_id.trim().is_empty() {
        return Err(ApiError::bad_request("device_id is required"));
    }

    let snapshot = DeviceSnapshot {
        device_id: request.device_id,
        device_name: request.device_name,
        state: request.state,
        percent: request.percent,
        eta_minutes: request.eta_minutes,
        job_name: request.job_name,
        observed_at: request.observed_at.unwrap_or_else(Utc::now),
    };
    state.monitor.inject_snapshot(snapshot);
    Ok(StatusCode::ACCEPTED)
}
