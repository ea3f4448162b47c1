//! Per-device snapshot cache.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::telemetry::DeviceSnapshot;

/// Cache state of one device.
#[derive(Debug, Clone, Default)]
pub struct DeviceCacheEntry {
    pub latest_snapshot: Option<DeviceSnapshot>,
    pub last_seen_at: Option<Instant>,
    pub offline_emitted: bool,
}

/// Latest known-good snapshot of a device plus silence tracking.
///
/// Written by the device's connection worker, read by its reporting worker.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entry: Mutex<DeviceCacheEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parsed snapshot received at `now`.
    ///
    /// Any message counts as a sign of life, but an `unknown` snapshot never
    /// replaces a previously cached one.
    pub fn record(&self, snapshot: DeviceSnapshot, now: Instant) {
        let mut entry = self.entry.lock();
        entry.last_seen_at = Some(now);
        let keep_previous = snapshot.is_unknown()
            && entry
                .latest_snapshot
                .as_ref()
                .is_some_and(|previous| !previous.is_unknown());
        if !keep_previous {
            entry.latest_snapshot = Some(snapshot);
        }
    }

    /// Decide what a reporting tick at `now` emits.
    ///
    /// Returns a synthetic offline snapshot once per silence window, the
    /// latest snapshot while the device is live, and nothing otherwise.
    pub fn tick(&self, now: Instant, offline_timeout: Duration) -> Option<DeviceSnapshot> {
        let mut entry = self.entry.lock();
        let last_seen = entry.last_seen_at?;

        if now.saturating_duration_since(last_seen) > offline_timeout {
            if entry.offline_emitted {
                return None;
            }
            entry.offline_emitted = true;
            let device_id = entry
                .latest_snapshot
                .as_ref()
                .map(|s| s.device_id.clone())?;
            return Some(DeviceSnapshot::offline(device_id, chrono::Utc::now()));
        }

        let snapshot = entry.latest_snapshot.clone()?;
        entry.offline_emitted = false;
        Some(snapshot)
    }

    /// Copy of the current entry.
    pub fn entry(&self) -> DeviceCacheEntry {
        self.entry.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn snapshot(state: &str) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::with_state("p1", state, Utc::now());
        snapshot.percent = Some(50.0);
        snapshot
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_unknown_does_not_overwrite_good() {
        let cache = SnapshotCache::new();
        let base = Instant::now();
        cache.record(snapshot("RUNNING"), base);
        cache.record(DeviceSnapshot::unknown("p1", Utc::now()), at(base, 5));

        let entry = cache.entry();
        assert_eq!(entry.latest_snapshot.unwrap().state, "RUNNING");
        assert_eq!(entry.last_seen_at, Some(at(base, 5)));
    }

    #[test]
    fn test_unknown_fills_empty_cache() {
        let cache = SnapshotCache::new();
        cache.record(DeviceSnapshot::unknown("p1", Utc::now()), Instant::now());
        assert!(cache.entry().latest_snapshot.unwrap().is_unknown());

        cache.record(snapshot("IDLE"), Instant::now());
        assert_eq!(cache.entry().latest_snapshot.unwrap().state, "IDLE");
    }

    #[test]
    fn test_never_seen_emits_nothing() {
        let cache = SnapshotCache::new();
        assert!(cache.tick(Instant::now(), TIMEOUT).is_none());
    }

    #[test]
    fn test_offline_once_per_silence_window() {
        let cache = SnapshotCache::new();
        let base = Instant::now();
        cache.record(snapshot("RUNNING"), base);

        let emitted: Vec<Option<String>> = [0, 15, 30, 45, 60, 75, 90]
            .into_iter()
            .map(|secs| cache.tick(at(base, secs), TIMEOUT).map(|s| s.state))
            .collect();
        assert_eq!(
            emitted,
            vec![
                Some("RUNNING".to_string()),
                Some("RUNNING".to_string()),
                Some("RUNNING".to_string()),
                Some("offline".to_string()),
                None,
                None,
                None,
            ]
        );
        assert!(cache.entry().offline_emitted);
    }

    #[test]
    fn test_new_report_resets_silence_window() {
        let cache = SnapshotCache::new();
        let base = Instant::now();
        cache.record(snapshot("RUNNING"), base);
        assert!(cache.tick(at(base, 45), TIMEOUT).unwrap().is_offline());

        cache.record(snapshot("IDLE"), at(base, 50));
        assert_eq!(cache.tick(at(base, 60), TIMEOUT).unwrap().state, "IDLE");
        assert!(!cache.entry().offline_emitted);

        assert!(cache.tick(at(base, 95), TIMEOUT).unwrap().is_offline());
        assert!(cache.tick(at(base, 110), TIMEOUT).is_none());
    }
}
