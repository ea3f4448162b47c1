//! Per-device job lifecycle state machine.
//!
//! A device is either idle (no [`ActiveJob`]) or printing (one active job).
//! Terminal outcomes are events: they remove the active job and are returned
//! to the caller as [`FinishedJob`]s for persistence and notification.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::classify::ClassificationRules;
use crate::database::models::JobStatus;
use crate::telemetry::DeviceSnapshot;

/// Job name used when the device never reported one.
pub const UNKNOWN_JOB_NAME: &str = "Unbekannter Job";

/// A job believed to be running on a device.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveJob {
    pub job_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_state: String,
    pub last_update: DateTime<Utc>,
}

impl ActiveJob {
    fn start(snapshot: &DeviceSnapshot) -> Self {
        Self {
            job_name: snapshot.job_name().map(str::to_string),
            start_time: snapshot.observed_at,
            last_state: snapshot.state.clone(),
            last_update: snapshot.observed_at,
        }
    }

    fn refresh(&mut self, snapshot: &DeviceSnapshot) {
        self.last_state = snapshot.state.clone();
        self.last_update = snapshot.observed_at;
        if self.job_name.is_none() {
            self.job_name = snapshot.job_name().map(str::to_string);
        }
    }

    fn finish(self, device_id: &str, status: JobStatus, at: DateTime<Utc>) -> FinishedJob {
        FinishedJob {
            device_id: device_id.to_string(),
            job_name: self
                .job_name
                .unwrap_or_else(|| UNKNOWN_JOB_NAME.to_string()),
            status,
            started_at: self.start_time,
            finished_at: at,
        }
    }
}

/// A terminal transition produced by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedJob {
    pub device_id: String,
    pub job_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FinishedJob {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }
}

/// Active jobs keyed by device id.
///
/// Callers must feed each device's snapshots from a single consumer so they
/// are applied in emission order.
pub struct JobTracker {
    rules: ClassificationRules,
    active: DashMap<String, ActiveJob>,
}

impl JobTracker {
    pub fn new(rules: ClassificationRules) -> Self {
        Self {
            rules,
            active: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    /// Active job for a device, if any.
    pub fn active_job(&self, device_id: &str) -> Option<ActiveJob> {
        self.active.get(device_id).map(|job| job.clone())
    }

    /// Apply one snapshot and return the jobs it finalized, in order.
    ///
    /// The snapshot's `observed_at` is the transition time.
    pub fn apply(&self, snapshot: &DeviceSnapshot) -> Vec<FinishedJob> {
        let class = self.rules.classify(snapshot);
        let now = snapshot.observed_at;
        let device_id = snapshot.device_id.as_str();
        let mut finished = Vec::new();

        match self.active.entry(snapshot.device_id.clone()) {
            Entry::Vacant(entry) => {
                if class.starts_job() {
                    tracing::debug!(
                        device_id,
                        job_name = snapshot.job_name().unwrap_or(UNKNOWN_JOB_NAME),
                        "Job started"
                    );
                    entry.insert(ActiveJob::start(snapshot));
                }
            }
            Entry::Occupied(mut entry) => {
                if class.failure {
                    finished.push(entry.remove().finish(device_id, JobStatus::Failed, now));
                } else if class.success {
                    finished.push(entry.remove().finish(device_id, JobStatus::Success, now));
                } else if class.printing {
                    let replaced = match (entry.get().job_name.as_deref(), snapshot.job_name()) {
                        (Some(current), Some(next)) => current != next,
                        _ => false,
                    };
                    if replaced {
                        let previous = entry.insert(ActiveJob::start(snapshot));
                        finished.push(previous.finish(device_id, JobStatus::Cancelled, now));
                    } else {
                        entry.get_mut().refresh(snapshot);
                    }
                } else if class.idle {
                    // Jobs only start and refresh on printing-like reports, so
                    // this is idle right after printing. Assumed to be a success.
                    finished.push(entry.remove().finish(device_id, JobStatus::Success, now));
                }
            }
        }

        finished
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(ClassificationRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn snap(state: &str, job: Option<&str>, percent: Option<f64>, at: i64) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::with_state("p1", state, t(at));
        snapshot.job_name = job.map(str::to_string);
        snapshot.percent = percent;
        snapshot
    }

    #[test]
    fn test_full_lifecycle_yields_one_success() {
        let tracker = JobTracker::default();
        assert!(tracker.apply(&snap("IDLE", None, None, 0)).is_empty());
        assert!(tracker.apply(&snap("RUNNING", Some("A"), Some(10.0), 10)).is_empty());
        assert!(tracker.apply(&snap("RUNNING", Some("A"), Some(55.0), 70)).is_empty());
        let finished = tracker.apply(&snap("RUNNING", Some("A"), Some(100.0), 130));

        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Success);
        assert_eq!(finished[0].job_name, "A");
        assert_eq!(finished[0].duration_seconds(), 120);
        assert!(tracker.active_job("p1").is_none());
    }

    #[test]
    fn test_new_job_name_cancels_previous() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", Some("A"), Some(20.0), 0));
        let finished = tracker.apply(&snap("RUNNING", Some("B"), Some(5.0), 30));

        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].job_name, "A");
        assert_eq!(finished[0].status, JobStatus::Cancelled);
        assert_eq!(finished[0].finished_at, t(30));

        let active = tracker.active_job("p1").unwrap();
        assert_eq!(active.job_name.as_deref(), Some("B"));
        assert_eq!(active.start_time, t(30));
    }

    #[test]
    fn test_empty_name_refreshes_and_backfills() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", None, Some(1.0), 0));
        tracker.apply(&snap("RUNNING", Some(""), Some(2.0), 15));
        assert_eq!(tracker.active_job("p1").unwrap().job_name, None);

        tracker.apply(&snap("RUNNING", Some("vase"), Some(3.0), 30));
        let active = tracker.active_job("p1").unwrap();
        assert_eq!(active.job_name.as_deref(), Some("vase"));
        assert_eq!(active.start_time, t(0));
        assert_eq!(active.last_update, t(30));

        // A blank name on an active named job is a refresh, not a replacement.
        assert!(tracker.apply(&snap("RUNNING", None, Some(4.0), 45)).is_empty());
    }

    #[test]
    fn test_failure_finalizes_as_failed() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", Some("A"), Some(40.0), 0));
        let finished = tracker.apply(&snap("FAILED", Some("A"), Some(40.0), 60));
        assert_eq!(finished[0].status, JobStatus::Failed);
    }

    #[test]
    fn test_idle_after_printing_is_success() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", Some("A"), Some(90.0), 0));
        let finished = tracker.apply(&snap("IDLE", None, None, 60));
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Success);
    }

    #[test]
    fn test_idle_after_progress_only_job_is_success() {
        let tracker = JobTracker::default();
        // Started from progress alone, the state token is not printing-like.
        tracker.apply(&snap("PREPARE", Some("A"), Some(40.0), 0));
        assert_eq!(tracker.active_job("p1").unwrap().last_state, "PREPARE");

        let finished = tracker.apply(&snap("READY", None, None, 30));
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Success);
        assert!(tracker.active_job("p1").is_none());
    }

    #[test]
    fn test_unnamed_job_uses_placeholder() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("printing", None, None, 0));
        let finished = tracker.apply(&snap("finish", None, None, 10));
        assert_eq!(finished[0].job_name, UNKNOWN_JOB_NAME);
    }

    #[test]
    fn test_no_active_job_ignores_non_printing() {
        let tracker = JobTracker::default();
        for state in ["IDLE", "FINISH", "FAILED", "offline", "unknown", "PAUSE"] {
            assert!(tracker.apply(&snap(state, Some("A"), None, 0)).is_empty());
        }
        assert!(tracker.active_job("p1").is_none());
    }

    #[test]
    fn test_finished_report_at_startup_does_not_start_job() {
        let tracker = JobTracker::default();
        assert!(tracker.apply(&snap("RUNNING", Some("A"), Some(100.0), 0)).is_empty());
        assert!(tracker.active_job("p1").is_none());
    }

    #[test]
    fn test_offline_and_unknown_keep_active_job() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", Some("A"), Some(10.0), 0));
        assert!(tracker.apply(&snap("offline", None, None, 45)).is_empty());
        assert!(tracker.apply(&snap("unknown", None, None, 60)).is_empty());
        assert_eq!(tracker.active_job("p1").unwrap().last_update, t(0));
    }

    #[test]
    fn test_devices_are_independent() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", Some("A"), Some(10.0), 0));
        let mut other = snap("RUNNING", Some("B"), Some(10.0), 0);
        other.device_id = "p2".to_string();
        assert!(tracker.apply(&other).is_empty());
        assert_eq!(tracker.active_job("p1").unwrap().job_name.as_deref(), Some("A"));
        assert_eq!(tracker.active_job("p2").unwrap().job_name.as_deref(), Some("B"));
    }

    #[test]
    fn test_negative_duration_clamped() {
        let tracker = JobTracker::default();
        tracker.apply(&snap("RUNNING", Some("A"), Some(10.0), 60));
        let finished = tracker.apply(&snap("FINISH", Some("A"), None, 0));
        assert_eq!(finished[0].duration_seconds(), 0);
    }
}
