//! Notification senders for Gatehouse.
//!
//! Delivers operator alerts (currently the disk-space alerts raised by the
//! admission checks) to a generic webhook, a Slack incoming webhook, or the
//! log.

pub mod channels;
pub mod sender;

pub use channels::{AuthType, ChannelConfig, HttpMethod, SlackConfig, WebhookAuth, WebhookConfig};
pub use sender::{
    LogSender, NotificationPayload, NotifyError, SlackSender, WebhookSender, create_sender,
};
