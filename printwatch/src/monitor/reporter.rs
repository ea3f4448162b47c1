//! Reporting worker: periodic emission of a device's cached state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::SnapshotCache;
use crate::database::repositories::PrinterRegistry;
use crate::dispatch::DispatchBridge;
use crate::telemetry::DeviceSnapshot;

pub(crate) struct ReportingWorker {
    pub device_id: String,
    /// Display name known when monitoring started.
    pub display_name: Option<String>,
    pub cache: Arc<SnapshotCache>,
    pub registry: Arc<dyn PrinterRegistry>,
    pub bridge: Arc<DispatchBridge>,
    /// Single-consumer queue into the job tracker.
    pub jobs: mpsc::Sender<DeviceSnapshot>,
    pub interval: Duration,
    pub offline_timeout: Duration,
}

impl ReportingWorker {
    pub async fn run(self, cancel: CancellationToken) {
        let device_id = self.device_id.as_str();
        info!(device_id, interval = ?self.interval, "Reporting worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(snapshot) = self.cache.tick(Instant::now(), self.offline_timeout) else {
                continue;
            };
            let snapshot = if snapshot.is_offline() {
                info!(device_id, "Device went silent, emitting offline");
                snapshot
            } else {
                let name = self.resolve_name().await;
                snapshot.with_device_name(name)
            };

            self.bridge.submit(snapshot.clone());

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = self.jobs.send(snapshot) => {
                    if sent.is_err() {
                        warn!(device_id, "Job tracker queue closed");
                    }
                }
            }
        }

        debug!(device_id, "Reporting worker stopped");
    }

    async fn resolve_name(&self) -> Option<String> {
        match self.registry.resolve_display_name(&self.device_id).await {
            Ok(Some(name)) => Some(name),
            Ok(None) => self.display_name.clone(),
            Err(e) => {
                debug!(device_id = %self.device_id, error = %e, "Display name lookup failed");
                self.display_name.clone()
            }
        }
    }
}
