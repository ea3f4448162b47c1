//! Finalize path: persistence and notification side effects of terminal
//! job transitions.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::tracker::{FinishedJob, JobTracker};
use crate::database::models::JobRecord;
use crate::database::repositories::{JobHistoryRepository, PrinterRegistry};
use crate::notification::NotificationDispatcher;
use crate::telemetry::DeviceSnapshot;

/// Consumes emitted snapshots and runs the finalize path for every job the
/// tracker ends.
pub struct JobLifecycle {
    tracker: JobTracker,
    registry: Arc<dyn PrinterRegistry>,
    history: Arc<dyn JobHistoryRepository>,
    notifier: Arc<NotificationDispatcher>,
    /// Devices whose finalize path is running.
    finalizing: Mutex<HashSet<String>>,
}

impl JobLifecycle {
    pub fn new(
        tracker: JobTracker,
        registry: Arc<dyn PrinterRegistry>,
        history: Arc<dyn JobHistoryRepository>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            tracker,
            registry,
            history,
            notifier,
            finalizing: Mutex::new(HashSet::new()),
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Apply one snapshot and finalize whatever it ended, in order.
    pub async fn process(&self, snapshot: &DeviceSnapshot) -> Vec<JobRecord> {
        let finished = self.tracker.apply(snapshot);
        if finished.is_empty() {
            return Vec::new();
        }

        // Left set if this future is dropped mid-way.
        self.finalizing.lock().insert(snapshot.device_id.clone());
        let mut records = Vec::with_capacity(finished.len());
        for job in finished {
            records.push(self.finalize(job, snapshot.device_name.as_deref()).await);
        }
        self.finalizing.lock().remove(&snapshot.device_id);
        records
    }

    /// Settle subscriptions left pending by a finalize that was aborted.
    ///
    /// Its job is already gone from the tracker, so they would otherwise
    /// fire on the next unrelated job. Returns whether anything was settled.
    pub async fn settle_interrupted(&self, device_id: &str) -> bool {
        if !self.finalizing.lock().remove(device_id) {
            return false;
        }
        let summary = self.notifier.fail_pending(device_id, "shutdown").await;
        warn!(
            device_id,
            failed = summary.failed,
            "Finalize interrupted, pending subscriptions failed"
        );
        true
    }

    /// Persist the record, then notify. The active job is already gone, so
    /// a failed write never causes a second finalize.
    async fn finalize(&self, job: FinishedJob, fallback_name: Option<&str>) -> JobRecord {
        let device_name = self.device_name(&job.device_id, fallback_name).await;
        let record = JobRecord::new(
            &job.device_id,
            &device_name,
            &job.job_name,
            job.status,
            job.started_at,
            job.finished_at,
        );

        info!(
            device_id = %record.device_id,
            job_name = %record.job_name,
            status = %record.status,
            duration_seconds = record.duration_seconds,
            "Job finished"
        );

        if let Err(e) = self.history.append(&record).await {
            warn!(
                device_id = %record.device_id,
                job_name = %record.job_name,
                error = %e,
                "Failed to write job history"
            );
        }

        self.notifier
            .dispatch(&record.device_id, &device_name, &record.job_name, record.status)
            .await;

        record
    }

    async fn device_name(&self, device_id: &str, fallback: Option<&str>) -> String {
        match self.registry.resolve_display_name(device_id).await {
            Ok(Some(name)) => name,
            Ok(None) => fallback.unwrap_or(device_id).to_string(),
            Err(e) => {
                warn!(device_id, error = %e, "Failed to resolve display name");
                fallback.unwrap_or(device_id).to_string()
            }
        }
    }
}
