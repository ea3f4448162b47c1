//! Snapshot classification table.
//!
//! State tokens are free-form vendor strings, so classification is a
//! case-insensitive substring match against configurable token sets.

use serde::{Deserialize, Serialize};

use crate::telemetry::DeviceSnapshot;

fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Token sets used to classify a snapshot's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationRules {
    pub printing: Vec<String>,
    pub success: Vec<String>,
    pub failure: Vec<String>,
    pub idle: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            printing: tokens(&["print", "run", "busy", "working"]),
            success: tokens(&["finish", "done", "complete", "success"]),
            failure: tokens(&["fail", "error", "cancel", "abort", "stop"]),
            idle: tokens(&["idle", "ready", "standby"]),
        }
    }
}

/// Classification flags of a single snapshot. Flags are not exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub printing: bool,
    pub success: bool,
    pub failure: bool,
    pub idle: bool,
}

impl Classification {
    /// Printing and not already reporting an outcome.
    pub fn starts_job(&self) -> bool {
        self.printing && !self.success && !self.failure
    }
}

impl ClassificationRules {
    pub fn classify(&self, snapshot: &DeviceSnapshot) -> Classification {
        let percent = snapshot.percent;
        Classification {
            printing: self.is_printing_state(&snapshot.state)
                || percent.is_some_and(|p| p > 0.0 && p < 100.0),
            success: contains_any(&snapshot.state, &self.success)
                || percent.is_some_and(|p| p >= 100.0),
            failure: contains_any(&snapshot.state, &self.failure),
            idle: contains_any(&snapshot.state, &self.idle),
        }
    }

    /// Whether a bare state token matches the printing set.
    pub fn is_printing_state(&self, state: &str) -> bool {
        contains_any(state, &self.printing)
    }
}

fn contains_any(state: &str, needles: &[String]) -> bool {
    let state = state.to_lowercase();
    needles
        .iter()
        .filter(|needle| !needle.is_empty())
        .any(|needle| state.contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn snapshot(state: &str, percent: Option<f64>) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::with_state("p1", state, Utc::now());
        snapshot.percent = percent;
        snapshot
    }

    #[rstest]
    #[case("RUNNING", None, true, false, false, false)]
    #[case("printing", None, true, false, false, false)]
    #[case("PREPARE", Some(42.0), true, false, false, false)]
    #[case("FINISH", None, false, true, false, false)]
    #[case("RUNNING", Some(100.0), true, true, false, false)]
    #[case("FAILED", None, false, false, true, false)]
    #[case("user_cancelled", None, false, false, true, false)]
    #[case("IDLE", None, false, false, false, true)]
    #[case("IDLE", Some(0.0), false, false, false, true)]
    #[case("offline", None, false, false, false, false)]
    #[case("unknown", None, false, false, false, false)]
    fn test_classify(
        #[case] state: &str,
        #[case] percent: Option<f64>,
        #[case] printing: bool,
        #[case] success: bool,
        #[case] failure: bool,
        #[case] idle: bool,
    ) {
        let rules = ClassificationRules::default();
        let class = rules.classify(&snapshot(state, percent));
        assert_eq!(
            class,
            Classification {
                printing,
                success,
                failure,
                idle
            }
        );
    }

    #[test]
    fn test_finished_printing_does_not_start_job() {
        let rules = ClassificationRules::default();
        assert!(!rules.classify(&snapshot("RUNNING", Some(100.0))).starts_job());
        assert!(rules.classify(&snapshot("RUNNING", Some(3.0))).starts_job());
    }

    #[test]
    fn test_rules_from_partial_json() {
        let rules: ClassificationRules =
            serde_json::from_str(r#"{"idle": ["sleeping"]}"#).unwrap();
        assert_eq!(rules.idle, vec!["sleeping".to_string()]);
        assert_eq!(rules.printing, ClassificationRules::default().printing);
        assert!(rules.classify(&snapshot("Sleeping", None)).idle);
    }
}
