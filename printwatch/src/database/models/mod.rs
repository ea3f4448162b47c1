//! Database models for printwatch.
//!
//! These models map directly to the database schema.

pub mod job;
pub mod notification;
pub mod printer;

pub use job::*;
pub use notification::*;
pub use printer::*;
