//! Live dashboard WebSocket.
//!
//! Each connection registers an observer with the hub, sends the latest
//! snapshot of every known device and then streams broadcast snapshots as
//! JSON text frames.

use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::api::server::AppState;
use crate::telemetry::DeviceSnapshot;

/// Heartbeat ping interval in seconds.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Frame sent to dashboard clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DashboardFrame<'a> {
    Snapshot(&'a DeviceSnapshot),
}

impl DashboardFrame<'_> {
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                debug!(error = %e, "Failed to encode dashboard frame");
                None
            }
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard_ws))
}

async fn dashboard_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let hub = state.monitor.hub().clone();
    let Some(mut observer) = hub.register() else {
        debug!("Observer hub closed, rejecting dashboard client");
        let _ = sender.close().await;
        return;
    };
    let observer_id = observer.id;

    // Registered before the initial frames so nothing broadcast in between is lost.
    let mut initial: Vec<DeviceSnapshot> = state
        .monitor
        .get_all_latest_snapshots()
        .into_values()
        .collect();
    initial.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    for snapshot in &initial {
        let Some(message) = DashboardFrame::Snapshot(snapshot).to_message() else {
            continue;
        };
        if sender.send(message).await.is_err() {
            debug!(observer_id, "Failed to send initial snapshot, client disconnected");
            hub.deregister(observer_id);
            return;
        }
    }

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat_interval.tick().await;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Err(e)) => {
                        debug!(observer_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            snapshot = observer.receiver.recv() => {
                // None: the hub dropped this observer or closed.
                let Some(snapshot) = snapshot else { break };
                let Some(message) = DashboardFrame::Snapshot(&snapshot).to_message() else {
                    continue;
                };
                if sender.send(message).await.is_err() {
                    break;
                }
            }

            _ = heartbeat_interval.tick() => {
                if awaiting_pong {
                    debug!(observer_id, "Client failed to respond to Ping, closing connection");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    hub.deregister(observer_id);
    let _ = sender.close().await;
    debug!(observer_id, "Dashboard connection closed");
}
