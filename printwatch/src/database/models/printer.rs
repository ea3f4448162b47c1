//! Printer registry models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Default MQTT-over-TLS port of the printers.
pub const DEFAULT_DEVICE_PORT: u16 = 8883;

/// Printer database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PrinterDbModel {
    /// Printer serial number.
    pub device_id: String,
    pub display_name: Option<String>,
    /// Host name or IP address on the local network.
    pub address: String,
    pub port: i64,
    /// LAN access code, used as the MQTT password.
    pub access_code: String,
    pub enabled: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Connection details of a device that can be monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredDevice {
    pub device_id: String,
    pub display_name: Option<String>,
    pub address: String,
    pub port: u16,
    pub access_code: String,
}

impl MonitoredDevice {
    pub fn new(
        device_id: impl Into<String>,
        address: impl Into<String>,
        access_code: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            display_name: None,
            address: address.into(),
            port: DEFAULT_DEVICE_PORT,
            access_code: access_code.into(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name, falling back to the device id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.device_id)
    }
}

impl From<PrinterDbModel> for MonitoredDevice {
    fn from(model: PrinterDbModel) -> Self {
        let port = u16::try_from(model.port).unwrap_or(DEFAULT_DEVICE_PORT);
        Self {
            device_id: model.device_id,
            display_name: model.display_name.filter(|name| !name.trim().is_empty()),
            address: model.address,
            port,
            access_code: model.access_code,
        }
    }
}
