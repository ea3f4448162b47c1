//! Repository layer for database access.
//!
//! Each external collaborator of the monitoring core is a trait here, with a
//! sqlx-backed implementation. The core only depends on the traits.

pub mod job;
pub mod notification;
pub mod printer;

pub use job::*;
pub use notification::*;
pub use printer::*;
