//! Notification audit record database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery status of a notification record.
///
/// A record moves at most once, from `Pending` to one of the terminal states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Skipped,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Audit record of one delivery attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationDbModel {
    pub id: String,
    pub organization_id: String,
    /// NULL for channels that are not user-specific
    pub user_id: Option<String>,
    pub event_id: String,
    pub workflow_id: String,
    pub channel_id: String,
    /// Channel type tag at the time of the attempt
    pub notification_type: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub delivery_error: Option<String>,
    /// JSON snapshot of the transmitted payload
    pub message_content: Option<String>,
    pub escalation_step: i64,
    /// Unix epoch milliseconds; set for delayed steps only
    pub scheduled_for: Option<i64>,
    /// Unix epoch milliseconds; set when status is sent
    pub sent_at: Option<i64>,
    /// Lease held by a sweeper processing this record
    pub claimed_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NotificationDbModel {
    pub fn status(&self) -> Option<NotificationStatus> {
        NotificationStatus::parse(&self.status)
    }
}

/// In-place update of an existing notification record.
#[derive(Debug, Clone)]
pub struct NotificationUpdate {
    pub status: NotificationStatus,
    pub delivery_error: Option<String>,
    pub message_content: Option<String>,
    /// Replaces the stored user only when set
    pub user_id: Option<String>,
    pub sent_at: Option<i64>,
    pub updated_at: i64,
}
