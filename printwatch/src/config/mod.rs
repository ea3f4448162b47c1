//! Application configuration.
//!
//! Values come from the environment (after `.env` is loaded by `main`) and
//! fall back to built-in defaults. Unparseable values are collected and
//! reported once logging is up.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::jobs::ClassificationRules;
use crate::monitor::MonitorConfig;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:printwatch.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Top-level configuration of the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    pub api: ApiServerConfig,
    pub monitor: MonitorConfig,
    /// PEM CA bundle used to verify printers.
    pub mqtt_ca_cert: Option<PathBuf>,
    /// JSON file overriding the job classification table.
    pub job_rules_path: Option<PathBuf>,
    /// Mount the snapshot injection endpoint.
    pub enable_debug_endpoints: bool,
    /// Values that were set but could not be used.
    pub ignored: Vec<IgnoredValue>,
}

/// A configuration value replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredValue {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            api: ApiServerConfig::default(),
            monitor: MonitorConfig::default(),
            mqtt_ca_cert: None,
            job_rules_path: None,
            enable_debug_endpoints: false,
            ignored: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();
        let mut ignored = Vec::new();

        if let Some(url) = var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = var("LOG_DIR") {
            config.log_dir = dir;
        }
        if let Some(address) = var("API_BIND_ADDRESS") {
            config.api.bind_address = address;
        }
        if let Some(port) = parsed::<u16>("API_PORT", var("API_PORT"), &mut ignored) {
            config.api.port = port;
        }

        let monitor = &mut config.monitor;
        if let Some(d) = seconds("REPORT_INTERVAL_SECS", var("REPORT_INTERVAL_SECS"), &mut ignored) {
            monitor.report_interval = d;
        }
        if let Some(d) = seconds("OFFLINE_TIMEOUT_SECS", var("OFFLINE_TIMEOUT_SECS"), &mut ignored) {
            monitor.offline_timeout = d;
        }
        if let Some(d) = seconds("RECONNECT_DELAY_SECS", var("RECONNECT_DELAY_SECS"), &mut ignored) {
            monitor.reconnect_delay = d;
        }
        if let Some(d) = seconds("SHUTDOWN_TIMEOUT_SECS", var("SHUTDOWN_TIMEOUT_SECS"), &mut ignored) {
            monitor.shutdown_timeout = d;
        }

        config.mqtt_ca_cert = var("MQTT_CA_CERT").map(PathBuf::from);
        config.job_rules_path = var("JOB_RULES_PATH").map(PathBuf::from);
        config.enable_debug_endpoints = var("ENABLE_DEBUG_ENDPOINTS")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"));

        config.ignored = ignored;
        config
    }

    /// Warn about every value that fell back to its default.
    ///
    /// Called after the subscriber is installed, since loading runs first.
    pub fn log_ignored(&self) {
        for entry in &self.ignored {
            warn!(key = entry.key, value = %entry.value, "Ignoring {}", entry.reason);
        }
    }

    /// Read the configured CA bundle, if any.
    pub fn load_ca_cert(&self) -> Result<Option<Vec<u8>>> {
        self.mqtt_ca_cert
            .as_ref()
            .map(|path| {
                std::fs::read(path).map_err(|e| {
                    Error::config(format!("Cannot read MQTT_CA_CERT '{}': {e}", path.display()))
                })
            })
            .transpose()
    }

    /// Classification table from `JOB_RULES_PATH`, or the default table.
    pub fn load_classification_rules(&self) -> Result<ClassificationRules> {
        let Some(path) = &self.job_rules_path else {
            return Ok(ClassificationRules::default());
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read JOB_RULES_PATH '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn parsed<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    ignored: &mut Vec<IgnoredValue>,
) -> Option<T> {
    let value = value?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            ignored.push(IgnoredValue {
                key,
                value,
                reason: "invalid configuration value",
            });
            None
        }
    }
}

/// Positive whole seconds.
fn seconds(
    key: &'static str,
    value: Option<String>,
    ignored: &mut Vec<IgnoredValue>,
) -> Option<Duration> {
    match parsed::<u64>(key, value, ignored)? {
        0 => {
            ignored.push(IgnoredValue {
                key,
                value: "0".to_string(),
                reason: "zero duration",
            });
            None
        }
        secs => Some(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.monitor.report_interval, Duration::from_secs(15));
        assert_eq!(config.monitor.offline_timeout, Duration::from_secs(30));
        assert_eq!(config.monitor.reconnect_delay, Duration::from_secs(2));
        assert!(!config.enable_debug_endpoints);
        assert!(config.load_ca_cert().unwrap().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("API_PORT", "9000"),
            ("REPORT_INTERVAL_SECS", "5"),
            ("OFFLINE_TIMEOUT_SECS", "12"),
            ("ENABLE_DEBUG_ENDPOINTS", "true"),
            ("LOG_DIR", " /var/log/printwatch "),
        ]);
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.monitor.report_interval, Duration::from_secs(5));
        assert_eq!(config.monitor.offline_timeout, Duration::from_secs(12));
        assert!(config.enable_debug_endpoints);
        assert_eq!(config.log_dir, "/var/log/printwatch");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("API_PORT", "eighty"),
            ("REPORT_INTERVAL_SECS", "0"),
            ("RECONNECT_DELAY_SECS", "-3"),
        ]);
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.monitor.report_interval, Duration::from_secs(15));
        assert_eq!(config.monitor.reconnect_delay, Duration::from_secs(2));

        let keys: Vec<_> = config.ignored.iter().map(|i| i.key).collect();
        assert_eq!(keys, ["API_PORT", "REPORT_INTERVAL_SECS", "RECONNECT_DELAY_SECS"]);
        assert_eq!(config.ignored[0].value, "eighty");
        assert_eq!(config.ignored[1].reason, "zero duration");
    }

    #[test]
    fn test_valid_values_ignore_nothing() {
        let config = config_from(&[("API_PORT", "9000"), ("REPORT_INTERVAL_SECS", "5")]);
        assert!(config.ignored.is_empty());
    }

    #[test]
    fn test_missing_ca_cert_is_config_error() {
        let config = config_from(&[("MQTT_CA_CERT", "/nonexistent/ca.pem")]);
        assert!(matches!(config.load_ca_cert(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_rules_file() {
        let path = std::env::temp_dir().join(format!("printwatch-rules-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"printing": ["druck"]}"#).unwrap();
        let config = config_from(&[("JOB_RULES_PATH", path.to_str().unwrap())]);

        let rules = config.load_classification_rules().unwrap();
        assert_eq!(rules.printing, vec!["druck".to_string()]);
        assert_eq!(rules.idle, ClassificationRules::default().idle);
        std::fs::remove_file(&path).unwrap();
    }
}
