//! Telemetry payload parser.
//!
//! Payloads are either a flat JSON object or an object nesting the status
//! under a `"print"` key. Each logical field is looked up through a fixed
//! list of candidate keys; the first present value that can be coerced to the
//! field's type wins.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::snapshot::{DeviceSnapshot, STATE_UNKNOWN};

const STATE_KEYS: &[&str] = &["stage", "gcode_state", "print_status", "state"];
const PERCENT_KEYS: &[&str] = &["mc_percent", "progress", "percent"];
const ETA_KEYS: &[&str] = &["mc_remaining_time", "remain_time", "time_remaining"];
const JOB_NAME_KEYS: &[&str] = &["subtask_name", "task_name"];

/// Parse a raw device message observed now.
pub fn parse(device_id: &str, raw: &[u8]) -> DeviceSnapshot {
    parse_at(device_id, raw, Utc::now())
}

/// Parse a raw device message with an explicit observation time.
///
/// Never fails. A payload that is not a JSON object yields an `unknown`
/// snapshot with every other field absent.
pub fn parse_at(device_id: &str, raw: &[u8], observed_at: DateTime<Utc>) -> DeviceSnapshot {
    let text = String::from_utf8_lossy(raw);
    let Ok(Value::Object(root)) = serde_json::from_str::<Value>(&text) else {
        return DeviceSnapshot::unknown(device_id, observed_at);
    };

    let fields = match root.get("print") {
        Some(Value::Object(nested)) => nested,
        _ => &root,
    };

    DeviceSnapshot {
        device_id: device_id.to_string(),
        device_name: None,
        state: first_token(fields, STATE_KEYS).unwrap_or_else(|| STATE_UNKNOWN.to_string()),
        percent: first_percent(fields, PERCENT_KEYS),
        eta_minutes: first_integer(fields, ETA_KEYS),
        job_name: first_text(fields, JOB_NAME_KEYS),
        observed_at,
    }
}

/// First non-empty scalar, rendered as a string.
fn first_token(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-empty string value.
fn first_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn first_percent(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(coerce_f64))
        .find(|value| (0.0..=100.0).contains(value))
}

fn first_integer(fields: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(coerce_i64))
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}
