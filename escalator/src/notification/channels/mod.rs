//! Channel senders.
//!
//! One [`ChannelSender`] per channel type:
//! - email (SMTP, preference-filtered)
//! - webhook, slack, zapier (HTTP POST)
//! - in_app (fans out to every organization user)
//! - telegram (Bot API when a token is configured, simulated otherwise)
//! - sms, whatsapp, iot_device (simulated transports)
//! - a fallback for unknown types

mod email;
mod in_app;
mod simulated;
mod slack;
mod telegram;
mod unsupported;
mod webhook;
mod zapier;

pub use email::EmailSender;
pub use in_app::InAppSender;
pub use simulated::SimulatedSender;
pub use slack::SlackSender;
pub use telegram::TelegramSender;
pub use unsupported::UnsupportedChannelSender;
pub use webhook::WebhookSender;
pub use zapier::ZapierSender;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::Result;
use crate::database::models::NotificationStatus;
use crate::domain::{Channel, Event, Workflow};

/// Everything a sender needs to deliver one step to one channel.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub event: &'a Event,
    pub workflow: &'a Workflow,
    pub channel: &'a Channel,
    pub step_index: usize,
    pub now: DateTime<Utc>,
}

impl DispatchContext<'_> {
    /// Plain-text alert body shared by the text-based channels.
    pub fn alert_text(&self) -> String {
        let mut text = format!(
            "{}\n{}\nSeverity: {} | Confidence: {:.0}%",
            self.event.alert_title(),
            self.event.alert_description(),
            self.event.severity.label(),
            self.event.confidence * 100.0,
        );
        if let Some(zone) = &self.event.zone_name {
            text.push_str(&format!(" | Zone: {}", zone));
        }
        text
    }

    /// Structured payload shared by the HTTP-based channels.
    pub fn alert_payload(&self) -> Value {
        json!({
            "event_id": self.event.id,
            "organization_id": self.event.organization_id,
            "workflow_id": self.workflow.id,
            "workflow_name": self.workflow.name,
            "event_type": self.event.event_type,
            "severity": self.event.severity.as_str(),
            "confidence": self.event.confidence,
            "zone_name": self.event.zone_name,
            "camera_name": self.event.camera_name,
            "title": self.event.alert_title(),
            "description": self.event.alert_description(),
            "escalation_step": self.step_index,
            "timestamp": self.event.created_at.to_rfc3339(),
        })
    }
}

/// Result of one delivery attempt, turned into an audit record by the logger.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub status: NotificationStatus,
    pub error: Option<String>,
    /// Snapshot of what was transmitted.
    pub content: Option<Value>,
    pub user_id: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent(content: Value) -> Self {
        Self {
            status: NotificationStatus::Sent,
            error: None,
            content: Some(content),
            user_id: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Failed,
            error: Some(error.into()),
            content: None,
            user_id: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Skipped,
            error: Some(reason.into()),
            content: None,
            user_id: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Delivers one dispatch for a single channel type.
///
/// Missing configuration and transport failures are reported as outcomes;
/// an `Err` is reserved for unexpected failures, which the dispatcher turns
/// into a `failed` record.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel type tag this sender handles.
    fn channel_type(&self) -> &'static str;

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>>;
}
