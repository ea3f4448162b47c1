//! Job lifecycle tracking.
//!
//! Turns the stream of emitted snapshots into start/finish/fail/cancel
//! transitions. The state machine itself is pure; side effects live in
//! [`JobLifecycle`].

pub mod classify;
pub mod lifecycle;
pub mod tracker;

pub use classify::{Classification, ClassificationRules};
pub use lifecycle::JobLifecycle;
pub use tracker::{ActiveJob, FinishedJob, JobTracker, UNKNOWN_JOB_NAME};
