//! Notification repositories: global config, recipients and subscriptions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::{
    NotificationConfig, NotificationConfigDbModel, NotificationSubscription, SubscriptionStatus,
};
use crate::database::time::{datetime_to_ms, now_ms};
use crate::{Error, Result};

/// Global notification settings store.
#[async_trait]
pub trait NotificationConfigRepository: Send + Sync {
    /// Current config. A missing row yields the disabled default.
    async fn get_config(&self) -> Result<NotificationConfig>;
    async fn save_config(&self, config: &NotificationConfig) -> Result<()>;
}

/// Per-user "notify me when this job ends" store.
#[async_trait]
pub trait NotificationSubscriptionRepository: Send + Sync {
    /// Create a pending subscription, or refresh the user's existing pending
    /// one for the same device.
    async fn subscribe(
        &self,
        username: &str,
        device_id: &str,
        job_name: Option<&str>,
    ) -> Result<NotificationSubscription>;
    /// Pending subscriptions for a device, oldest first, with recipient ids.
    async fn find_pending(&self, device_id: &str) -> Result<Vec<NotificationSubscription>>;
    async fn update_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        error: Option<&str>,
        notified_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn list_for_user(&self, username: &str) -> Result<Vec<NotificationSubscription>>;
    /// Map a username to a direct-message identity.
    async fn set_recipient(&self, username: &str, recipient_id: &str) -> Result<()>;
}

const SUBSCRIPTION_SELECT: &str = r#"
    SELECT s.id, s.username, s.device_id, s.job_name, s.status, s.last_error,
           s.created_at, s.notified_at, r.recipient_id
    FROM notification_subscription s
    LEFT JOIN notification_recipient r ON r.username = s.username
"#;

/// SQLx implementation of both notification repositories.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_subscription(&self, id: &str) -> Result<NotificationSubscription> {
        sqlx::query_as::<_, NotificationSubscription>(&format!(
            "{SUBSCRIPTION_SELECT} WHERE s.id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("NotificationSubscription", id))
    }
}

#[async_trait]
impl NotificationConfigRepository for SqlxNotificationRepository {
    async fn get_config(&self) -> Result<NotificationConfig> {
        let model = sqlx::query_as::<_, NotificationConfigDbModel>(
            r#"
            SELECT enabled, mode, template, webhook_url, bot_token, timeout_secs
            FROM notification_config WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(model.map(NotificationConfig::from).unwrap_or_default())
    }

    async fn save_config(&self, config: &NotificationConfig) -> Result<()> {
        let timeout_secs = i64::try_from(config.timeout_secs)
            .map_err(|_| Error::validation("timeout_secs out of range"))?;
        sqlx::query(
            r#"
            INSERT INTO notification_config (id, enabled, mode, template, webhook_url, bot_token, timeout_secs)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                mode = excluded.mode,
                template = excluded.template,
                webhook_url = excluded.webhook_url,
                bot_token = excluded.bot_token,
                timeout_secs = excluded.timeout_secs
            "#,
        )
        .bind(config.enabled)
        .bind(config.mode.as_str())
        .bind(&config.template)
        .bind(&config.webhook_url)
        .bind(&config.bot_token)
        .bind(timeout_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSubscriptionRepository for SqlxNotificationRepository {
    async fn subscribe(
        &self,
        username: &str,
        device_id: &str,
        job_name: Option<&str>,
    ) -> Result<NotificationSubscription> {
        // One statement so concurrent re-subscribes refresh instead of racing.
        let (id,): (String,) = sqlx::query_as(
            r#"
            INSERT INTO notification_subscription (id, username, device_id, job_name, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(username, device_id) WHERE status = 'pending' DO UPDATE SET
                job_name = excluded.job_name,
                created_at = excluded.created_at,
                last_error = NULL
            RETURNING id
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(username)
        .bind(device_id)
        .bind(job_name)
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await?;

        self.get_subscription(&id).await
    }

    async fn find_pending(&self, device_id: &str) -> Result<Vec<NotificationSubscription>> {
        let subs = sqlx::query_as::<_, NotificationSubscription>(&format!(
            "{SUBSCRIPTION_SELECT} WHERE s.device_id = ? AND s.status = 'pending' ORDER BY s.created_at"
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn update_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        error: Option<&str>,
        notified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_subscription
            SET status = ?, last_error = ?, notified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(notified_at.map(datetime_to_ms))
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_user(&self, username: &str) -> Result<Vec<NotificationSubscription>> {
        let subs = sqlx::query_as::<_, NotificationSubscription>(&format!(
            "{SUBSCRIPTION_SELECT} WHERE s.username = ? ORDER BY s.created_at DESC"
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn set_recipient(&self, username: &str, recipient_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_recipient (username, recipient_id) VALUES (?, ?)
            ON CONFLICT(username) DO UPDATE SET recipient_id = excluded.recipient_id
            "#,
        )
        .bind(username)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
