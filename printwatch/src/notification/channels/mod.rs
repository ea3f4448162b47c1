//! Notification delivery channels.
//!
//! - Group webhook: one message per subscription posted to a shared channel
//! - Direct message: one private message per user through a bot account

mod direct;
mod webhook;

pub use direct::{DEFAULT_API_BASE, DirectMessageChannel};
pub use webhook::WebhookChannel;

use std::time::Duration;

use async_trait::async_trait;

use crate::database::models::{DeliveryMode, NotificationConfig, NotificationSubscription};
use crate::{Error, Result};

/// A backend that can deliver a rendered message for one subscription.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Deliver a rendered message to the subscriber.
    async fn deliver(&self, subscription: &NotificationSubscription, message: &str) -> Result<()>;
}

/// Build the channel selected by the configuration.
///
/// Fails when the selected mode is missing its credentials.
pub fn build_channel(config: &NotificationConfig) -> Result<Box<dyn DeliveryChannel>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.mode {
        DeliveryMode::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or_else(|| Error::config("webhook mode requires a webhook_url"))?;
            Ok(Box::new(WebhookChannel::new(url, timeout)))
        }
        DeliveryMode::DirectMessage => {
            let token = config
                .bot_token
                .as_deref()
                .ok_or_else(|| Error::config("direct_message mode requires a bot_token"))?;
            Ok(Box::new(DirectMessageChannel::new(token, timeout)))
        }
    }
}

/// Turn a non-2xx response into a delivery error carrying status and body.
pub(crate) async fn check_response(what: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::delivery(format!("{what} failed: {status} - {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NotificationConfig;

    #[test]
    fn test_build_channel_requires_credentials() {
        let config = NotificationConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(matches!(build_channel(&config), Err(Error::Configuration(_))));

        let config = NotificationConfig {
            enabled: true,
            mode: DeliveryMode::DirectMessage,
            ..Default::default()
        };
        assert!(matches!(build_channel(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_build_channel_by_mode() {
        let config = NotificationConfig {
            enabled: true,
            webhook_url: Some("http://localhost/hook".to_string()),
            ..Default::default()
        };
        assert_eq!(build_channel(&config).unwrap().channel_type(), "webhook");

        let config = NotificationConfig {
            enabled: true,
            mode: DeliveryMode::DirectMessage,
            bot_token: Some("token".to_string()),
            ..Default::default()
        };
        assert_eq!(build_channel(&config).unwrap().channel_type(), "direct_message");
    }
}
