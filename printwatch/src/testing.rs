//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::database::models::{
    JobRecord, MonitoredDevice, NotificationConfig, NotificationSubscription, PrinterDbModel,
    SubscriptionStatus,
};
use crate::database::repositories::{
    JobHistoryRepository, NotificationConfigRepository, NotificationSubscriptionRepository,
    PrinterRegistry,
};
use crate::database::time::{datetime_to_ms, now_ms};
use crate::monitor::{TelemetrySource, TelemetryStream};
use crate::{Error, Result};

#[derive(Default)]
pub struct MemoryRegistry {
    devices: Mutex<HashMap<String, MonitoredDevice>>,
}

impl MemoryRegistry {
    pub fn with_devices(devices: impl IntoIterator<Item = MonitoredDevice>) -> Self {
        let registry = Self::default();
        for device in devices {
            registry.insert(device);
        }
        registry
    }

    pub fn insert(&self, device: MonitoredDevice) {
        self.devices.lock().insert(device.device_id.clone(), device);
    }
}

#[async_trait]
impl PrinterRegistry for MemoryRegistry {
    async fn list_monitored_devices(&self) -> Result<Vec<MonitoredDevice>> {
        let mut devices: Vec<_> = self.devices.lock().values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<MonitoredDevice>> {
        Ok(self.devices.lock().get(device_id).cloned())
    }

    async fn resolve_display_name(&self, device_id: &str) -> Result<Option<String>> {
        Ok(self
            .devices
            .lock()
            .get(device_id)
            .and_then(|d| d.display_name.clone()))
    }

    async fn upsert_device(&self, printer: &PrinterDbModel) -> Result<()> {
        self.insert(MonitoredDevice::from(printer.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobHistory {
    records: Mutex<Vec<JobRecord>>,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
}

impl MemoryJobHistory {
    pub fn records(&self) -> Vec<JobRecord> {
        self.records.lock().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every append hang forever.
    pub fn stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobHistoryRepository for MemoryJobHistory {
    async fn append(&self, record: &JobRecord) -> Result<()> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database("disk full".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn list_recent(&self, device_id: Option<&str>, limit: i64) -> Result<Vec<JobRecord>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .filter(|r| device_id.is_none_or(|id| r.device_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryNotificationStore {
    config: Mutex<NotificationConfig>,
    subscriptions: Mutex<Vec<NotificationSubscription>>,
    recipients: Mutex<HashMap<String, String>>,
}

impl MemoryNotificationStore {
    pub fn get(&self, id: &str) -> Option<NotificationSubscription> {
        let mut sub = self
            .subscriptions
            .lock()
            .iter()
            .find(|s| s.id == id)
            .cloned()?;
        sub.recipient_id = self.recipients.lock().get(&sub.username).cloned();
        Some(sub)
    }
}

#[async_trait]
impl NotificationConfigRepository for MemoryNotificationStore {
    async fn get_config(&self) -> Result<NotificationConfig> {
        Ok(self.config.lock().clone())
    }

    async fn save_config(&self, config: &NotificationConfig) -> Result<()> {
        *self.config.lock() = config.clone();
        Ok(())
    }
}

#[async_trait]
impl NotificationSubscriptionRepository for MemoryNotificationStore {
    async fn subscribe(
        &self,
        username: &str,
        device_id: &str,
        job_name: Option<&str>,
    ) -> Result<NotificationSubscription> {
        let id = {
            let mut subs = self.subscriptions.lock();
            let pending = SubscriptionStatus::Pending.as_str();
            match subs
                .iter_mut()
                .find(|s| s.username == username && s.device_id == device_id && s.status == pending)
            {
                Some(existing) => {
                    existing.job_name = job_name.map(str::to_string);
                    existing.created_at = now_ms();
                    existing.id.clone()
                }
                None => {
                    let sub = NotificationSubscription {
                        id: uuid::Uuid::new_v4().to_string(),
                        username: username.to_string(),
                        device_id: device_id.to_string(),
                        job_name: job_name.map(str::to_string),
                        status: pending.to_string(),
                        last_error: None,
                        created_at: now_ms(),
                        notified_at: None,
                        recipient_id: None,
                    };
                    let id = sub.id.clone();
                    subs.push(sub);
                    id
                }
            }
        };
        self.get(&id)
            .ok_or_else(|| Error::not_found("NotificationSubscription", id))
    }

    async fn find_pending(&self, device_id: &str) -> Result<Vec<NotificationSubscription>> {
        let ids: Vec<String> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.device_id == device_id && s.status == SubscriptionStatus::Pending.as_str())
            .map(|s| s.id.clone())
            .collect();
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }

    async fn update_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        error: Option<&str>,
        notified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(sub) = self
            .subscriptions
            .lock()
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            sub.status = status.as_str().to_string();
            sub.last_error = error.map(str::to_string);
            sub.notified_at = notified_at.map(datetime_to_ms);
        }
        Ok(())
    }

    async fn list_for_user(&self, username: &str) -> Result<Vec<NotificationSubscription>> {
        let ids: Vec<String> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.username == username)
            .map(|s| s.id.clone())
            .collect();
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }

    async fn set_recipient(&self, username: &str, recipient_id: &str) -> Result<()> {
        self.recipients
            .lock()
            .insert(username.to_string(), recipient_id.to_string());
        Ok(())
    }
}

/// Telemetry source fed from test code.
///
/// Devices with a registered feed receive its payloads and see the stream end
/// when the feed is dropped; other devices connect and then stay silent.
#[derive(Default)]
pub struct FeedSource {
    feeds: Mutex<HashMap<String, mpsc::UnboundedReceiver<Bytes>>>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FeedSource {
    pub fn feed(&self, device_id: &str) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().insert(device_id.to_string(), rx);
        tx
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for FeedSource {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn connect(&self, device: &MonitoredDevice) -> Result<Box<dyn TelemetryStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FeedStream {
            rx: self.feeds.lock().remove(&device.device_id),
            closes: self.closes.clone(),
        }))
    }
}

struct FeedStream {
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl TelemetryStream for FeedStream {
    async fn next_message(&mut self) -> Result<Option<Bytes>> {
        match self.rx.as_mut() {
            Some(rx) => Ok(rx.recv().await),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Source whose devices are never reachable.
#[derive(Default)]
pub struct UnreachableSource {
    attempts: AtomicUsize,
}

impl UnreachableSource {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for UnreachableSource {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn connect(&self, device: &MonitoredDevice) -> Result<Box<dyn TelemetryStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::transport(format!("{} unreachable", device.address)))
    }
}
