//! Notification dispatcher.
//!
//! Runs on every terminal job transition and settles the device's pending
//! subscriptions: failed or cancelled jobs fail them without delivery, a
//! successful job delivers one rendered message per subscription.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::channels::{self, DeliveryChannel};
use super::template::{self, TemplateContext};
use crate::database::models::{JobStatus, NotificationSubscription, SubscriptionStatus};
use crate::database::repositories::{
    NotificationConfigRepository, NotificationSubscriptionRepository,
};

/// Per-dispatch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Matches pending subscriptions to finished jobs and delivers messages.
pub struct NotificationDispatcher {
    config: Arc<dyn NotificationConfigRepository>,
    subscriptions: Arc<dyn NotificationSubscriptionRepository>,
}

impl NotificationDispatcher {
    pub fn new(
        config: Arc<dyn NotificationConfigRepository>,
        subscriptions: Arc<dyn NotificationSubscriptionRepository>,
    ) -> Self {
        Self {
            config,
            subscriptions,
        }
    }

    /// Settle all pending subscriptions of a device for a finished job.
    ///
    /// Never fails. Store and delivery errors are recorded or logged.
    pub async fn dispatch(
        &self,
        device_id: &str,
        device_name: &str,
        job_name: &str,
        status: JobStatus,
    ) -> DispatchSummary {
        let pending = match self.subscriptions.find_pending(device_id).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(device_id, error = %e, "Failed to load pending subscriptions");
                return DispatchSummary::default();
            }
        };
        if pending.is_empty() {
            debug!(device_id, "No pending subscriptions");
            return DispatchSummary::default();
        }

        if !status.is_success() {
            return self
                .settle_all(&pending, SubscriptionStatus::Failed, Some(status.as_str()))
                .await;
        }

        let config = match self.config.get_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!(device_id, error = %e, "Failed to load notification config");
                let reason = format!("config unavailable: {e}");
                return self
                    .settle_all(&pending, SubscriptionStatus::Failed, Some(&reason))
                    .await;
            }
        };
        if !config.enabled {
            return self
                .settle_all(&pending, SubscriptionStatus::Skipped, None)
                .await;
        }

        let channel = match channels::build_channel(&config) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(device_id, error = %e, "Notification channel misconfigured");
                return self
                    .settle_all(&pending, SubscriptionStatus::Failed, Some(&e.to_string()))
                    .await;
            }
        };

        let job = FinishedJobContext {
            device_id,
            device_name,
            job_name,
            status,
        };
        let summary = self
            .deliver_all(channel.as_ref(), &config.template, &pending, &job)
            .await;
        info!(
            device_id,
            job_name,
            channel = channel.channel_type(),
            sent = summary.sent,
            failed = summary.failed,
            "Notifications dispatched"
        );
        summary
    }

    /// Fail every pending subscription of a device without delivery.
    pub async fn fail_pending(&self, device_id: &str, reason: &str) -> DispatchSummary {
        match self.subscriptions.find_pending(device_id).await {
            Ok(pending) => {
                self.settle_all(&pending, SubscriptionStatus::Failed, Some(reason))
                    .await
            }
            Err(e) => {
                warn!(device_id, error = %e, "Failed to load pending subscriptions");
                DispatchSummary::default()
            }
        }
    }

    /// Deliver to each subscription independently and record each outcome.
    pub(crate) async fn deliver_all(
        &self,
        channel: &dyn DeliveryChannel,
        template: &str,
        pending: &[NotificationSubscription],
        job: &FinishedJobContext<'_>,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for subscription in pending {
            let message = template::render(
                template,
                &TemplateContext {
                    username: &subscription.username,
                    device_id: job.device_id,
                    device_name: job.device_name,
                    job_name: job.job_name,
                    status: job.status.as_str(),
                    recipient_id: subscription.recipient_id.as_deref(),
                },
            );

            match channel.deliver(subscription, &message).await {
                Ok(()) => {
                    summary.sent += 1;
                    self.record(subscription, SubscriptionStatus::Sent, None)
                        .await;
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        subscription_id = %subscription.id,
                        username = %subscription.username,
                        error = %e,
                        "Notification delivery failed"
                    );
                    self.record(subscription, SubscriptionStatus::Failed, Some(&e.to_string()))
                        .await;
                }
            }
        }
        summary
    }

    async fn settle_all(
        &self,
        pending: &[NotificationSubscription],
        status: SubscriptionStatus,
        error: Option<&str>,
    ) -> DispatchSummary {
        for subscription in pending {
            self.record(subscription, status, error).await;
        }
        let count = pending.len();
        match status {
            SubscriptionStatus::Skipped => DispatchSummary {
                skipped: count,
                ..Default::default()
            },
            _ => DispatchSummary {
                failed: count,
                ..Default::default()
            },
        }
    }

    async fn record(
        &self,
        subscription: &NotificationSubscription,
        status: SubscriptionStatus,
        error: Option<&str>,
    ) {
        let notified_at = (status == SubscriptionStatus::Sent).then(Utc::now);
        if let Err(e) = self
            .subscriptions
            .update_status(&subscription.id, status, error, notified_at)
            .await
        {
            warn!(
                subscription_id = %subscription.id,
                status = %status,
                error = %e,
                "Failed to record subscription status"
            );
        }
    }
}

/// The finished job a dispatch is about.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FinishedJobContext<'a> {
    pub device_id: &'a str,
    pub device_name: &'a str,
    pub job_name: &'a str,
    pub status: JobStatus,
}
