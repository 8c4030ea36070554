//! Event database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Detection event produced by an external pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventDbModel {
    pub id: String,
    pub organization_id: String,
    pub event_type: String,
    /// low, medium, high or critical
    pub severity: String,
    pub confidence: f64,
    pub zone_name: Option<String>,
    pub camera_name: String,
    pub description: String,
    /// Unix epoch milliseconds
    pub created_at: i64,
}
