//! Notification channel database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Notification channel database model.
/// Represents a configured destination for alerts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelDbModel {
    pub id: String,
    pub organization_id: String,
    /// Channel type tag: email, webhook, in_app, sms, ...
    pub channel_type: String,
    pub channel_name: String,
    pub is_active: bool,
    /// JSON blob for channel-specific settings
    pub channel_configuration: String,
}

/// Known channel type tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Email,
    Webhook,
    InApp,
    Sms,
    Whatsapp,
    IotDevice,
    Slack,
    Telegram,
    Zapier,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::InApp => "in_app",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::IotDevice => "iot_device",
            Self::Slack => "slack",
            Self::Telegram => "telegram",
            Self::Zapier => "zapier",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }
}
