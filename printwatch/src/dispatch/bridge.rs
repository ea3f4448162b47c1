//! Dispatch bridge: hands snapshots from device workers to the broadcast
//! loop and keeps the latest snapshot of every device.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::hub::ObserverHub;
use crate::telemetry::DeviceSnapshot;

/// Thread-safe submission point into the broadcast loop.
///
/// The broadcast loop runs on the runtime handle captured at construction,
/// so `submit` may be called from any thread, inside or outside the runtime.
/// A single loop keeps every observer's view in submission order.
pub struct DispatchBridge {
    sender: mpsc::UnboundedSender<Arc<DeviceSnapshot>>,
    hub: Arc<ObserverHub>,
    latest: DashMap<String, DeviceSnapshot>,
    cancel: CancellationToken,
}

impl DispatchBridge {
    /// Start the broadcast loop on `handle`.
    pub fn start(
        handle: &Handle,
        hub: Arc<ObserverHub>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = handle.spawn(broadcast_loop(receiver, hub.clone(), cancel.clone()));
        let bridge = Arc::new(Self {
            sender,
            hub,
            latest: DashMap::new(),
            cancel,
        });
        (bridge, task)
    }

    /// Record a snapshot as the device's latest and queue it for broadcast.
    ///
    /// Never blocks and never fails; after shutdown only the latest map is
    /// updated.
    pub fn submit(&self, snapshot: DeviceSnapshot) {
        self.latest
            .insert(snapshot.device_id.clone(), snapshot.clone());
        if self.sender.send(Arc::new(snapshot)).is_err() {
            trace!("Broadcast loop stopped; snapshot not broadcast");
        }
    }

    pub fn hub(&self) -> &Arc<ObserverHub> {
        &self.hub
    }

    pub fn latest_snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.latest.get(device_id).map(|s| s.value().clone())
    }

    pub fn all_latest_snapshots(&self) -> HashMap<String, DeviceSnapshot> {
        self.latest
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Stop the broadcast loop and disconnect all observers.
    pub fn close(&self) {
        self.cancel.cancel();
        self.hub.close();
    }
}

async fn broadcast_loop(
    mut receiver: mpsc::UnboundedReceiver<Arc<DeviceSnapshot>>,
    hub: Arc<ObserverHub>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = receiver.recv() => {
                let Some(snapshot) = next else { break };
                let delivered = hub.broadcast(snapshot);
                trace!(observers = delivered, "Snapshot broadcast");
            }
        }
    }
    debug!("Broadcast loop stopped");
}
