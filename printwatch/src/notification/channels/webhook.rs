//! Group webhook channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::{DeliveryChannel, check_response};
use crate::database::models::NotificationSubscription;
use crate::utils::http_client;
use crate::{Error, Result};

/// Posts `{"content": message}` to a chat webhook URL.
pub struct WebhookChannel {
    url: String,
    client: Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: http_client::build_client(timeout),
        }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, subscription: &NotificationSubscription, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "content": message }))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("Webhook request failed: {e}")))?;
        check_response("Webhook", response).await?;

        debug!(subscription_id = %subscription.id, "Webhook notification sent");
        Ok(())
    }
}
