//! Device telemetry: normalized status snapshots and the payload parser.
//!
//! Device payloads are vendor-defined JSON documents. The parser reduces them
//! to a [`DeviceSnapshot`] and never fails: anything it cannot make sense of
//! becomes an `unknown` snapshot.

mod parser;
mod snapshot;

pub use parser::{parse, parse_at};
pub use snapshot::{DeviceSnapshot, STATE_OFFLINE, STATE_UNKNOWN};
