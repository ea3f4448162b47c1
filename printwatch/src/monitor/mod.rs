//! Device monitoring: connection workers, snapshot caches, reporting
//! workers and the service that owns them.

pub mod cache;
pub mod config;
mod connection;
pub mod mqtt;
mod reporter;
pub mod service;
pub mod transport;

pub use cache::{DeviceCacheEntry, SnapshotCache};
pub use config::MonitorConfig;
pub use mqtt::MqttTelemetrySource;
pub use service::{PrinterMonitor, StopOutcome};
pub use transport::{TelemetrySource, TelemetryStream};
