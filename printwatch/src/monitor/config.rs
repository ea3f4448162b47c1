//! Monitor timing and capacity settings.

use std::time::Duration;

/// Settings shared by every device's worker pair.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Reporting worker tick.
    pub report_interval: Duration,
    /// Silence after which a synthetic offline snapshot is emitted.
    pub offline_timeout: Duration,
    /// Delay before a connection worker reconnects.
    pub reconnect_delay: Duration,
    /// Bounded join per device when stopping.
    pub shutdown_timeout: Duration,
    /// How long a job consumer may keep finalizing after its reporter stopped.
    pub job_drain_timeout: Duration,
    /// Queue length of each live observer.
    pub observer_buffer: usize,
    /// Queue length between a reporting worker and its job consumer.
    pub job_queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(15),
            offline_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
            job_drain_timeout: Duration::from_secs(30),
            observer_buffer: 64,
            job_queue_capacity: 64,
        }
    }
}
