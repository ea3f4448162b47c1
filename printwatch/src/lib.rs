//! printwatch library crate.
//!
//! Printer telemetry monitoring, print job lifecycle tracking and job-end
//! notifications.

pub mod api;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod telemetry;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
