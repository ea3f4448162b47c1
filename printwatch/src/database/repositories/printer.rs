//! Printer registry repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{MonitoredDevice, PrinterDbModel};

/// Source of monitored devices and their display names.
#[async_trait]
pub trait PrinterRegistry: Send + Sync {
    /// All devices that should be monitored at startup.
    async fn list_monitored_devices(&self) -> Result<Vec<MonitoredDevice>>;
    /// Look up a single device, enabled or not.
    async fn get_device(&self, device_id: &str) -> Result<Option<MonitoredDevice>>;
    /// Current display name of a device.
    async fn resolve_display_name(&self, device_id: &str) -> Result<Option<String>>;
    /// Insert a printer or replace its connection details.
    async fn upsert_device(&self, printer: &PrinterDbModel) -> Result<()>;
}

/// SQLx implementation of PrinterRegistry.
pub struct SqlxPrinterRegistry {
    pool: SqlitePool,
}

impl SqlxPrinterRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrinterRegistry for SqlxPrinterRegistry {
    async fn list_monitored_devices(&self) -> Result<Vec<MonitoredDevice>> {
        let printers = sqlx::query_as::<_, PrinterDbModel>(
            "SELECT * FROM printer WHERE enabled = 1 ORDER BY device_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(printers.into_iter().map(MonitoredDevice::from).collect())
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<MonitoredDevice>> {
        let printer =
            sqlx::query_as::<_, PrinterDbModel>("SELECT * FROM printer WHERE device_id = ?")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(printer.map(MonitoredDevice::from))
    }

    async fn resolve_display_name(&self, device_id: &str) -> Result<Option<String>> {
        let name: Option<(Option<String>,)> =
            sqlx::query_as("SELECT display_name FROM printer WHERE device_id = ?")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name
            .and_then(|(name,)| name)
            .filter(|name| !name.trim().is_empty()))
    }

    async fn upsert_device(&self, printer: &PrinterDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO printer (device_id, display_name, address, port, access_code, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(device_id) DO UPDATE SET
                display_name = excluded.display_name,
                address = excluded.address,
                port = excluded.port,
                access_code = excluded.access_code,
                enabled = excluded.enabled
            "#,
        )
        .bind(&printer.device_id)
        .bind(&printer.display_name)
        .bind(&printer.address)
        .bind(printer.port)
        .bind(&printer.access_code)
        .bind(printer.enabled)
        .bind(printer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
