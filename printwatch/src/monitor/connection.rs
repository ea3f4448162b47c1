//! Device connection worker.
//!
//! Keeps a telemetry subscription to one device alive until cancelled,
//! writing every parsed payload into the device's cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::SnapshotCache;
use super::transport::TelemetrySource;
use crate::database::models::MonitoredDevice;
use crate::telemetry;

pub(crate) struct ConnectionWorker {
    pub device: MonitoredDevice,
    pub source: Arc<dyn TelemetrySource>,
    pub cache: Arc<SnapshotCache>,
    pub reconnect_delay: Duration,
}

impl ConnectionWorker {
    /// Run until `cancel` fires. Connection failures and stream drops are
    /// retried after `reconnect_delay`.
    pub async fn run(self, cancel: CancellationToken) {
        let device_id = self.device.device_id.as_str();
        info!(device_id, transport = self.source.name(), "Connection worker started");

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.source.connect(&self.device) => result,
            };

            match connected {
                Ok(mut stream) => {
                    info!(device_id, address = %self.device.address, "Connected to device");
                    loop {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                stream.close().await;
                                info!(device_id, "Connection worker stopped");
                                return;
                            }
                            message = stream.next_message() => match message {
                                Ok(Some(payload)) => {
                                    let snapshot = telemetry::parse(device_id, &payload);
                                    if snapshot.is_unknown() {
                                        debug!(device_id, bytes = payload.len(), "Unparseable payload");
                                    }
                                    self.cache.record(snapshot, Instant::now());
                                }
                                Ok(None) => {
                                    warn!(device_id, "Device closed the telemetry stream");
                                    break;
                                }
                                Err(e) => {
                                    warn!(device_id, error = %e, "Telemetry stream failed");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(device_id, error = %e, "Failed to connect to device");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    debug!(device_id, "Reconnecting");
                }
            }
        }

        info!(device_id, "Connection worker stopped");
    }
}
