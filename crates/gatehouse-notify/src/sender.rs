//! Notification senders.

use crate::channels::*;
use async_trait::async_trait;
use gatehouse_core::ports::{Notification, NotificationSender, NotificationSeverity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

impl From<NotifyError> for gatehouse_core::Error {
    fn from(e: NotifyError) -> Self {
        gatehouse_core::Error::Notification(e.to_string())
    }
}

/// Body posted to a generic webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub severity: String,
    pub source: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity: severity_label(NotificationSeverity::Info).to_string(),
            source: "gatehouse".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl From<&Notification> for NotificationPayload {
    fn from(notification: &Notification) -> Self {
        let mut payload = NotificationPayload::new(&notification.title, &notification.body);
        payload.severity = severity_label(notification.severity).to_string();
        payload
    }
}

fn severity_label(severity: NotificationSeverity) -> &'static str {
    match severity {
        NotificationSeverity::Info => "info",
        NotificationSeverity::Warning => "warning",
        NotificationSeverity::Error => "error",
        NotificationSeverity::Critical => "critical",
    }
}

async fn check_response(response: reqwest::Response, channel: &str) -> Result<(), NotifyError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(NotifyError::DeliveryFailed(format!(
            "{} returned {}: {}",
            channel, status, body
        )));
    }
    Ok(())
}

/// Slack notification sender.
pub struct SlackSender {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackSender {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_message(&self, payload: &NotificationPayload) -> serde_json::Value {
        let color = match payload.severity.as_str() {
            "critical" | "error" => "#dc3545",
            "warning" => "#ffc107",
            _ => "#0366d6",
        };

        let mut message = serde_json::json!({
            "username": self.config.username,
            "icon_emoji": self.config.icon_emoji,
            "attachments": [{
                "color": color,
                "title": payload.title,
                "text": payload.message,
                "ts": payload.timestamp.timestamp()
            }]
        });
        if let Some(ref channel) = self.config.channel {
            message["channel"] = serde_json::Value::String(channel.clone());
        }
        message
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        debug!(webhook = %self.config.webhook_url, "Sending Slack notification");

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&self.build_message(payload))
            .send()
            .await?;
        check_response(response, "Slack").await?;

        info!("Slack notification sent successfully");
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    async fn send(&self, notification: &Notification) -> gatehouse_core::Result<()> {
        Ok(self.deliver(&NotificationPayload::from(notification)).await?)
    }
}

/// Generic webhook sender.
pub struct WebhookSender {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(config: WebhookConfig) -> Self {
        let timeout = config.timeout_seconds;
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout as u64))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        debug!(url = %self.config.url, "Sending webhook notification");

        let mut request = match self.config.method {
            HttpMethod::POST => self.client.post(&self.config.url),
            HttpMethod::PUT => self.client.put(&self.config.url),
        };

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        if let Some(ref auth) = self.config.auth {
            request = match auth.auth_type {
                AuthType::Bearer => request.bearer_auth(&auth.token),
                AuthType::Basic => request.basic_auth(&auth.token, None::<&str>),
            };
        }

        let response = request.json(payload).send().await?;
        check_response(response, "Webhook").await?;

        info!(url = %self.config.url, "Webhook notification sent successfully");
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, notification: &Notification) -> gatehouse_core::Result<()> {
        Ok(self.deliver(&NotificationPayload::from(notification)).await?)
    }
}

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &Notification) -> gatehouse_core::Result<()> {
        match notification.severity {
            NotificationSeverity::Info => {
                info!(title = %notification.title, body = %notification.body, "Notification")
            }
            NotificationSeverity::Warning => {
                warn!(title = %notification.title, body = %notification.body, "Notification")
            }
            NotificationSeverity::Error | NotificationSeverity::Critical => {
                error!(title = %notification.title, body = %notification.body, "Notification")
            }
        }
        Ok(())
    }
}

/// Create a sender for a channel configuration.
pub fn create_sender(config: &ChannelConfig) -> Arc<dyn NotificationSender> {
    match config {
        ChannelConfig::Slack(c) => Arc::new(SlackSender::new(c.clone())),
        ChannelConfig::Webhook(c) => Arc::new(WebhookSender::new(c.clone())),
        ChannelConfig::Log => Arc::new(LogSender),
    }
}
