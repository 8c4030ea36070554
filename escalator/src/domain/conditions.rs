//! Workflow trigger conditions.
//!
//! A workflow fires for an event when every clause present in its trigger
//! conditions passes. Absent clauses are wildcards, so an empty condition
//! set matches every event.

use serde::{Deserialize, Serialize};

use super::entities::Event;
use super::severity::Severity;

/// Trigger conditions attached to a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConditions {
    /// Event types the workflow reacts to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
    /// Severities the workflow reacts to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_levels: Option<Vec<Severity>>,
    /// Minimum event confidence. Compared inclusively (`>=`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_gt: Option<f64>,
    /// Zones the workflow reacts to. An empty list is a wildcard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
}

impl TriggerConditions {
    /// Parse conditions from their stored JSON form.
    ///
    /// A missing or `null` value means "no constraints".
    pub fn from_json(raw: Option<&str>) -> crate::Result<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("null") => Ok(Self::default()),
            Some(json) => Ok(serde_json::from_str(json)?),
        }
    }

    /// Whether no clause is present.
    pub fn is_empty(&self) -> bool {
        self.event_types.is_none()
            && self.severity_levels.is_none()
            && self.confidence_gt.is_none()
            && self.zones.is_none()
    }

    /// Check whether `event` satisfies every present clause.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(event_types) = &self.event_types {
            if !event_types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }

        if let Some(levels) = &self.severity_levels {
            if !levels.contains(&event.severity) {
                return false;
            }
        }

        if let Some(threshold) = self.confidence_gt {
            if event.confidence < threshold {
                return false;
            }
        }

        if let Some(zones) = self.zones.as_ref().filter(|z| !z.is_empty()) {
            match &event.zone_name {
                Some(zone) if zones.iter().any(|z| z == zone) => {}
                _ => return false,
            }
        }

        true
    }
}
