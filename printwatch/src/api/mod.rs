//! HTTP and WebSocket API.
//!
//! Exposes live printer state, job history, notification subscriptions and
//! runtime logging controls.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
