//! Live observer registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::telemetry::DeviceSnapshot;

/// A registered observer: its id and the receiving end of its queue.
pub struct Observer {
    pub id: u64,
    pub receiver: mpsc::Receiver<Arc<DeviceSnapshot>>,
}

struct HubState {
    accepting: bool,
    observers: HashMap<u64, mpsc::Sender<Arc<DeviceSnapshot>>>,
}

/// Set of connected observers, each with a bounded queue.
///
/// Sends never block: an observer whose queue is full or closed is dropped
/// and is expected to reconnect.
pub struct ObserverHub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ObserverHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            state: Mutex::new(HubState {
                accepting: true,
                observers: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new observer. Returns `None` once the hub is closed.
    pub fn register(&self) -> Option<Observer> {
        let mut state = self.state.lock();
        if !state.accepting {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        state.observers.insert(id, sender);
        debug!(observer_id = id, observers = state.observers.len(), "Observer registered");
        Some(Observer { id, receiver })
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn deregister(&self, id: u64) {
        if self.state.lock().observers.remove(&id).is_some() {
            debug!(observer_id = id, "Observer deregistered");
        }
    }

    /// Send a snapshot to every observer; returns how many accepted it.
    pub fn broadcast(&self, snapshot: Arc<DeviceSnapshot>) -> usize {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state
            .observers
            .retain(|id, sender| match sender.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(e) => {
                    debug!(observer_id = *id, error = %e, "Dropping observer");
                    false
                }
            });
        let delivered = state.observers.len();
        if delivered < before {
            debug!(dropped = before - delivered, "Observers dropped during broadcast");
        }
        delivered
    }

    /// Stop accepting observers and drop all existing ones.
    ///
    /// Dropping the senders ends each observer's receive loop.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.accepting = false;
        state.observers.clear();
    }

    pub fn is_closed(&self) -> bool {
        !self.state.lock().accepting
    }

    pub fn len(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(state: &str) -> Arc<DeviceSnapshot> {
        Arc::new(DeviceSnapshot::with_state("p1", state, Utc::now()))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let hub = ObserverHub::new(4);
        let mut a = hub.register().unwrap();
        let mut b = hub.register().unwrap();
        assert_ne!(a.id, b.id);

        assert_eq!(hub.broadcast(snapshot("RUNNING")), 2);
        assert_eq!(a.receiver.recv().await.unwrap().state, "RUNNING");
        assert_eq!(b.receiver.recv().await.unwrap().state, "RUNNING");
    }

    #[tokio::test]
    async fn test_closed_observer_is_dropped() {
        let hub = ObserverHub::new(4);
        let a = hub.register().unwrap();
        let mut b = hub.register().unwrap();
        drop(a.receiver);

        assert_eq!(hub.broadcast(snapshot("IDLE")), 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(b.receiver.recv().await.unwrap().state, "IDLE");
    }

    #[test]
    fn test_full_observer_is_dropped() {
        let hub = ObserverHub::new(1);
        let _slow = hub.register().unwrap();
        assert_eq!(hub.broadcast(snapshot("a")), 1);
        assert_eq!(hub.broadcast(snapshot("b")), 0);
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_close_rejects_and_disconnects() {
        let hub = ObserverHub::new(4);
        let mut a = hub.register().unwrap();
        hub.close();

        assert!(hub.is_closed());
        assert!(hub.register().is_none());
        assert!(a.receiver.recv().await.is_none());
    }

    #[test]
    fn test_deregister_unknown_is_noop() {
        let hub = ObserverHub::new(4);
        hub.deregister(42);
        let a = hub.register().unwrap();
        hub.deregister(a.id);
        assert!(hub.is_empty());
    }
}
