//! Direct-message channel through a Discord bot account.
//!
//! Delivery opens (or reuses) the DM channel with the recipient and then
//! posts the message into it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{DeliveryChannel, check_response};
use crate::database::models::NotificationSubscription;
use crate::utils::http_client;
use crate::{Error, Result};

/// Discord REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

/// Sends one private message per subscription.
pub struct DirectMessageChannel {
    token: String,
    api_base: String,
    client: Client,
}

impl DirectMessageChannel {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: http_client::build_client(timeout),
        }
    }

    /// Override the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn open_dm(&self, recipient_id: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/users/@me/channels", self.api_base))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&json!({ "recipient_id": recipient_id }))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("DM channel request failed: {e}")))?;
        let channel: DmChannel = check_response("DM channel", response)
            .await?
            .json()
            .await
            .map_err(|e| Error::delivery(format!("Invalid DM channel response: {e}")))?;
        Ok(channel.id)
    }
}

#[async_trait]
impl DeliveryChannel for DirectMessageChannel {
    fn channel_type(&self) -> &'static str {
        "direct_message"
    }

    async fn deliver(&self, subscription: &NotificationSubscription, message: &str) -> Result<()> {
        let recipient_id = subscription
            .recipient_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::delivery(format!("No recipient id for user '{}'", subscription.username))
            })?;

        let channel_id = self.open_dm(recipient_id).await?;
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_base, channel_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&json!({ "content": message }))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("DM request failed: {e}")))?;
        check_response("DM", response).await?;

        debug!(
            subscription_id = %subscription.id,
            username = %subscription.username,
            "Direct message sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn subscription(recipient_id: Option<&str>) -> NotificationSubscription {
        NotificationSubscription {
            id: "s1".to_string(),
            username: "anna".to_string(),
            device_id: "p1".to_string(),
            job_name: Some("benchy".to_string()),
            status: "pending".to_string(),
            last_error: None,
            created_at: 0,
            notified_at: None,
            recipient_id: recipient_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_direct_message_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .and(header("authorization", "Bot secret"))
            .and(body_json(json!({ "recipient_id": "4242" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "dm-1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/dm-1/messages"))
            .and(body_json(json!({ "content": "fertig" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let channel =
            DirectMessageChannel::new("secret", Duration::from_secs(5)).with_api_base(server.uri());
        channel
            .deliver(&subscription(Some("4242")), "fertig")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let channel =
            DirectMessageChannel::new("secret", Duration::from_secs(5)).with_api_base(server.uri());
        let err = channel.deliver(&subscription(None), "x").await.unwrap_err();
        assert!(err.to_string().contains("No recipient id"));
    }

    #[tokio::test]
    async fn test_rejected_token_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let channel =
            DirectMessageChannel::new("bad", Duration::from_secs(5)).with_api_base(server.uri());
        let err = channel
            .deliver(&subscription(Some("4242")), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }
}
