//! Printer monitor service.
//!
//! Owns the per-device worker registry. Each monitored device gets a
//! connection worker, a reporting worker and a job consumer that feeds the
//! shared job lifecycle in emission order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex as SyncMutex;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{DeviceCacheEntry, SnapshotCache};
use super::config::MonitorConfig;
use super::connection::ConnectionWorker;
use super::reporter::ReportingWorker;
use super::transport::TelemetrySource;
use crate::database::models::MonitoredDevice;
use crate::database::repositories::PrinterRegistry;
use crate::dispatch::{DispatchBridge, ObserverHub};
use crate::jobs::JobLifecycle;
use crate::telemetry::DeviceSnapshot;
use crate::{Error, Result};

/// Running workers of one device.
struct DeviceWorkers {
    cancel: CancellationToken,
    cache: Arc<SnapshotCache>,
    tasks: JoinSet<()>,
    /// Job consumer, stopped after the reporter so queued snapshots drain.
    consumer: JoinHandle<()>,
}

/// How a device's workers ended when stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Graceful,
    /// Workers missed the shutdown timeout and were aborted.
    Forced,
}

/// Monitoring service for all devices.
pub struct PrinterMonitor {
    config: MonitorConfig,
    registry: Arc<dyn PrinterRegistry>,
    source: Arc<dyn TelemetrySource>,
    lifecycle: Arc<JobLifecycle>,
    bridge: Arc<DispatchBridge>,
    workers: Mutex<HashMap<String, DeviceWorkers>>,
    broadcast_task: SyncMutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl PrinterMonitor {
    /// Create the service. The broadcast loop is started on `handle`.
    pub fn new(
        config: MonitorConfig,
        registry: Arc<dyn PrinterRegistry>,
        source: Arc<dyn TelemetrySource>,
        lifecycle: Arc<JobLifecycle>,
        handle: &Handle,
        cancel: CancellationToken,
    ) -> Self {
        let hub = Arc::new(ObserverHub::new(config.observer_buffer));
        let (bridge, broadcast_task) = DispatchBridge::start(handle, hub, cancel.child_token());
        Self {
            config,
            registry,
            source,
            lifecycle,
            bridge,
            workers: Mutex::new(HashMap::new()),
            broadcast_task: SyncMutex::new(Some(broadcast_task)),
            cancel,
        }
    }

    pub fn bridge(&self) -> &Arc<DispatchBridge> {
        &self.bridge
    }

    pub fn hub(&self) -> &Arc<ObserverHub> {
        self.bridge.hub()
    }

    pub fn lifecycle(&self) -> &Arc<JobLifecycle> {
        &self.lifecycle
    }

    /// Start monitoring every enabled device in the registry.
    pub async fn start_all(&self) -> Result<usize> {
        let devices = self.registry.list_monitored_devices().await?;
        let mut started = 0;
        for device in devices {
            if self.start_device(device).await {
                started += 1;
            }
        }
        info!(started, "Monitoring started for registered devices");
        Ok(started)
    }

    /// Start monitoring a registered device.
    ///
    /// Returns `false` if it is already monitored.
    pub async fn start_monitoring(&self, device_id: &str) -> Result<bool> {
        if self.is_monitoring(device_id).await {
            return Ok(false);
        }
        let device = self
            .registry
            .get_device(device_id)
            .await?
            .ok_or_else(|| Error::not_found("Printer", device_id))?;
        Ok(self.start_device(device).await)
    }

    /// Start the worker set for a device.
    ///
    /// Returns `false` if the device is already monitored or the service is
    /// shutting down.
    pub async fn start_device(&self, device: MonitoredDevice) -> bool {
        let mut workers = self.workers.lock().await;
        if self.cancel.is_cancelled() || workers.contains_key(&device.device_id) {
            return false;
        }

        let device_id = device.device_id.clone();
        let cancel = self.cancel.child_token();
        let cache = Arc::new(SnapshotCache::new());
        let (jobs_tx, mut jobs_rx) = mpsc::channel::<DeviceSnapshot>(self.config.job_queue_capacity.max(1));
        let mut tasks = JoinSet::new();

        let reporter = ReportingWorker {
            device_id: device_id.clone(),
            display_name: device.display_name.clone(),
            cache: cache.clone(),
            registry: self.registry.clone(),
            bridge: self.bridge.clone(),
            jobs: jobs_tx,
            interval: self.config.report_interval,
            offline_timeout: self.config.offline_timeout,
        };
        let connection = ConnectionWorker {
            device,
            source: self.source.clone(),
            cache: cache.clone(),
            reconnect_delay: self.config.reconnect_delay,
        };

        tasks.spawn(connection.run(cancel.clone()));
        tasks.spawn(reporter.run(cancel.clone()));

        // Ends once the reporter drops its sender.
        let lifecycle = self.lifecycle.clone();
        let consumer = tokio::spawn(async move {
            while let Some(snapshot) = jobs_rx.recv().await {
                lifecycle.process(&snapshot).await;
            }
        });

        workers.insert(
            device_id.clone(),
            DeviceWorkers {
                cancel,
                cache,
                tasks,
                consumer,
            },
        );
        info!(device_id = %device_id, "Monitoring started");
        true
    }

    /// Stop monitoring a device. Unknown devices are a no-op.
    ///
    /// Returns whether the device was being monitored.
    pub async fn stop_monitoring(&self, device_id: &str) -> bool {
        let Some(workers) = self.workers.lock().await.remove(device_id) else {
            debug!(device_id, "Stop requested for unmonitored device");
            return false;
        };
        let outcome = self.stop_workers(device_id, workers).await;
        info!(device_id, ?outcome, "Monitoring stopped");
        true
    }

    /// Stop every device. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(String, DeviceWorkers)> =
            self.workers.lock().await.drain().collect();
        let count = drained.len();

        let outcomes = join_all(
            drained
                .into_iter()
                .map(|(device_id, workers)| async move {
                    self.stop_workers(&device_id, workers).await
                }),
        )
        .await;

        let forced = outcomes
            .iter()
            .filter(|o| **o == StopOutcome::Forced)
            .count();
        info!(stopped = count, forced, "All devices stopped");
        count
    }

    /// Close the observer hub, stop all workers and the broadcast loop.
    pub async fn shutdown(&self) {
        info!("Shutting down printer monitor");
        self.bridge.close();
        self.cancel.cancel();
        self.stop_all().await;

        let broadcast_task = self.broadcast_task.lock().take();
        if let Some(task) = broadcast_task {
            if tokio::time::timeout(self.config.shutdown_timeout, task)
                .await
                .is_err()
            {
                warn!("Broadcast loop did not stop in time");
            }
        }
    }

    async fn stop_workers(&self, device_id: &str, mut workers: DeviceWorkers) -> StopOutcome {
        workers.cancel.cancel();
        let mut outcome = self.join_workers(device_id, &mut workers.tasks).await;

        // The reporter is gone, so the consumer ends after the queued snapshots.
        let drained =
            tokio::time::timeout(self.config.job_drain_timeout, &mut workers.consumer).await;
        match drained {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(device_id, error = %e, "Job consumer failed"),
            Err(_) => {
                warn!(device_id, "Job consumer did not drain in time, aborting");
                workers.consumer.abort();
                let _ = workers.consumer.await;
                self.lifecycle.settle_interrupted(device_id).await;
                outcome = StopOutcome::Forced;
            }
        }
        outcome
    }

    async fn join_workers(&self, device_id: &str, tasks: &mut JoinSet<()>) -> StopOutcome {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        device_id,
                        remaining = tasks.len(),
                        "Workers did not stop in time, aborting"
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return StopOutcome::Forced;
                }
                next = tasks.join_next() => match next {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!(device_id, error = %e, "Worker task failed"),
                    None => return StopOutcome::Graceful,
                }
            }
        }
    }

    pub async fn is_monitoring(&self, device_id: &str) -> bool {
        self.workers.lock().await.contains_key(device_id)
    }

    /// Ids of monitored devices, sorted.
    pub async fn monitored_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cache state of a monitored device.
    pub async fn cache_entry(&self, device_id: &str) -> Option<DeviceCacheEntry> {
        self.workers
            .lock()
            .await
            .get(device_id)
            .map(|w| w.cache.entry())
    }

    /// Last snapshot emitted for a device.
    pub fn get_latest_snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.bridge.latest_snapshot(device_id)
    }

    /// Last snapshot emitted for every device.
    pub fn get_all_latest_snapshots(&self) -> HashMap<String, DeviceSnapshot> {
        self.bridge.all_latest_snapshots()
    }

    /// Push a synthetic snapshot straight into the broadcast path.
    ///
    /// The job tracker does not see injected snapshots.
    pub fn inject_snapshot(&self, snapshot: DeviceSnapshot) {
        debug!(device_id = %snapshot.device_id, state = %snapshot.state, "Injecting snapshot");
        self.bridge.submit(snapshot);
    }
}
