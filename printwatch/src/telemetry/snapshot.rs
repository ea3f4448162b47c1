//! Normalized device status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State token used when a payload could not be interpreted.
pub const STATE_UNKNOWN: &str = "unknown";

/// State token of the synthetic event emitted after a silence timeout.
pub const STATE_OFFLINE: &str = "offline";

/// A normalized point-in-time status reading for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Stable device identifier (printer serial).
    pub device_id: String,
    /// Display name, filled in by the reporting worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Free-form state token as reported by the device.
    pub state: String,
    /// Job progress in percent (0-100).
    #[serde(default)]
    pub percent: Option<f64>,
    /// Remaining time in minutes.
    #[serde(default)]
    pub eta_minutes: Option<i64>,
    /// Name of the current job.
    #[serde(default)]
    pub job_name: Option<String>,
    /// When the reading was taken.
    pub observed_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Create a snapshot carrying only a state token.
    pub fn with_state(
        device_id: impl Into<String>,
        state: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: None,
            state: state.into(),
            percent: None,
            eta_minutes: None,
            job_name: None,
            observed_at,
        }
    }

    /// Snapshot for a payload that could not be parsed.
    pub fn unknown(device_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self::with_state(device_id, STATE_UNKNOWN, observed_at)
    }

    /// Synthetic snapshot for a device that stopped reporting.
    pub fn offline(device_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self::with_state(device_id, STATE_OFFLINE, observed_at)
    }

    /// Check whether this snapshot carries no usable state.
    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Check whether this is a synthetic offline snapshot.
    pub fn is_offline(&self) -> bool {
        self.state == STATE_OFFLINE
    }

    /// Attach a display name.
    pub fn with_device_name(mut self, device_name: Option<String>) -> Self {
        self.device_name = device_name;
        self
    }

    /// Job name with surrounding whitespace removed, `None` when empty.
    pub fn job_name(&self) -> Option<&str> {
        self.job_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
