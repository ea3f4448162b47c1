//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/live", get(liveness_check))
}

/// Liveness check - is the service alive?
/// Returns HTTP 200 with status, uptime and the number of monitored devices.
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let monitored = state.monitor.monitored_devices().await.len();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": uptime,
            "monitored_devices": monitored,
        })),
    )
}
