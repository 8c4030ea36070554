//! User and notification preference database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Organization member who can receive in-app or email alerts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    pub id: String,
    pub organization_id: String,
    pub email: String,
    pub full_name: Option<String>,
}

/// Per-user, per-organization notification preferences.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserNotificationPreferencesDbModel {
    pub user_id: String,
    pub organization_id: String,
    pub mute_alerts: bool,
    pub severity_threshold: String,
    /// JSON array of channel type tags
    pub blocked_channels: String,
    /// JSON array of `{days, start_time, end_time}`
    pub do_not_disturb_windows: String,
}
