//! Fan-out of emitted snapshots to live dashboard observers.

pub mod bridge;
pub mod hub;

pub use bridge::DispatchBridge;
pub use hub::{Observer, ObserverHub};
