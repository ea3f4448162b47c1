//! Job completion notifications.
//!
//! Users subscribe to a device; when the device's current job ends the
//! dispatcher renders a message template and delivers it through the
//! configured channel, recording the outcome on each subscription.

pub mod channels;
pub mod service;
pub mod template;

pub use channels::{DeliveryChannel, DirectMessageChannel, WebhookChannel};
pub use service::{DispatchSummary, NotificationDispatcher};
pub use template::{TemplateContext, render};
