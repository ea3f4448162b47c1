//! Notification subscription routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::database::models::NotificationSubscription;

pub fn router() -> Router<AppState> {
    Router::new().route("/subscriptions", post(subscribe).get(list_subscriptions))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub user: String,
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub user: Option<String>,
}

/// Subscribe a user to the end of the current job on a device.
///
/// The job name hint comes from the device's latest snapshot, if any.
async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<NotificationSubscription>)> {
    let user = request.user.trim();
    let device_id = request.device_id.trim();
    if user.is_empty() || device_id.is_empty() {
        return Err(ApiError::bad_request("user and device_id are required"));
    }

    let job_hint = state
        .monitor
        .get_latest_snapshot(device_id)
        .and_then(|snapshot| snapshot.job_name().map(str::to_string));

    let subscription = state
        .subscriptions
        .subscribe(user, device_id, job_hint.as_deref())
        .await?;
    tracing::info!(
        user,
        device_id,
        job_name = job_hint.as_deref().unwrap_or_default(),
        "Notification subscription registered"
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionsQuery>,
) -> ApiResult<Json<Vec<NotificationSubscription>>> {
    let user = query
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("user query parameter is required"))?;
    Ok(Json(state.subscriptions.list_for_user(user).await?))
}
