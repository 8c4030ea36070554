//! Workflow database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Organization-scoped alerting rule.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkflowDbModel {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub is_active: bool,
    /// JSON object; NULL means no constraints
    pub trigger_conditions: Option<String>,
    /// JSON array of `{channel_ids, delay_minutes}`
    pub escalation_policy: String,
    pub use_user_preferences: bool,
    /// Unix epoch milliseconds
    pub created_at: i64,
}
