//! Notification database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// Message template used when none is configured.
pub const DEFAULT_TEMPLATE: &str =
    "{mention} Druckauftrag \"{job_name}\" auf {device_name} ist beendet ({status}).";

/// Default request timeout for delivery backends.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;

/// Delivery state of a subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// A user's request to be told when the current job on a device ends.
///
/// `recipient_id` is joined in from `notification_recipient` and is only
/// needed for direct-message delivery.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationSubscription {
    pub id: String,
    pub username: String,
    pub device_id: String,
    /// Job name seen when the subscription was made.
    pub job_name: Option<String>,
    pub status: String,
    pub last_error: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub notified_at: Option<i64>,
    #[sqlx(default)]
    pub recipient_id: Option<String>,
}

impl NotificationSubscription {
    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.status.parse().ok()
    }

    pub fn notified_at(&self) -> Option<DateTime<Utc>> {
        self.notified_at.map(ms_to_datetime)
    }
}

/// How notifications are delivered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One message per subscription to a shared channel webhook.
    #[default]
    Webhook,
    /// One private message per user through a bot account.
    DirectMessage,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::DirectMessage => "direct_message",
        }
    }
}

/// Global notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub mode: DeliveryMode,
    pub template: String,
    pub webhook_url: Option<String>,
    pub bot_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DeliveryMode::Webhook,
            template: DEFAULT_TEMPLATE.to_string(),
            webhook_url: None,
            bot_token: None,
            timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
        }
    }
}

/// Notification config database model.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationConfigDbModel {
    pub enabled: bool,
    pub mode: String,
    pub template: String,
    pub webhook_url: Option<String>,
    pub bot_token: Option<String>,
    pub timeout_secs: i64,
}

impl From<NotificationConfigDbModel> for NotificationConfig {
    fn from(model: NotificationConfigDbModel) -> Self {
        let mode = model.mode.parse().unwrap_or_else(|_| {
            tracing::warn!(mode = %model.mode, "Unknown notification mode, using webhook");
            DeliveryMode::Webhook
        });
        let template = if model.template.trim().is_empty() {
            DEFAULT_TEMPLATE.to_string()
        } else {
            model.template
        };
        Self {
            enabled: model.enabled,
            mode,
            template,
            webhook_url: model.webhook_url.filter(|url| !url.trim().is_empty()),
            bot_token: model.bot_token.filter(|token| !token.trim().is_empty()),
            timeout_secs: u64::try_from(model.timeout_secs)
                .ok()
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
        }
    }
}
