//! Notification channel configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where alerts are delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Slack(SlackConfig),
    Webhook(WebhookConfig),
    /// Alerts only go to the log.
    #[default]
    Log,
}

/// Slack incoming-webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_icon")]
    pub icon_emoji: String,
}

fn default_username() -> String {
    "Gatehouse".to_string()
}

fn default_icon() -> String {
    ":rotating_light:".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            channel: None,
            username: default_username(),
            icon_emoji: default_icon(),
        }
    }
}

/// Generic webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}

fn default_timeout() -> u32 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: HttpMethod::default(),
            headers: HashMap::new(),
            auth: None,
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    POST,
    PUT,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAuth {
    pub auth_type: AuthType,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    Basic,
}
