//! Telemetry transport abstraction.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::database::models::MonitoredDevice;

/// Opens telemetry subscriptions to devices.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Transport name, for logs.
    fn name(&self) -> &'static str;

    /// Connect to a device and subscribe to its status reports.
    async fn connect(&self, device: &MonitoredDevice) -> Result<Box<dyn TelemetryStream>>;
}

/// An open subscription.
#[async_trait]
pub trait TelemetryStream: Send {
    /// Next raw payload. Returns `None` when the device closed the stream.
    async fn next_message(&mut self) -> Result<Option<Bytes>>;

    /// Close the subscription. Best effort.
    async fn close(&mut self);
}
