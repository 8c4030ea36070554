//! Typed records the engine works with.
//!
//! Each entity is built from its database model, parsing the JSON columns
//! and severity labels once at the edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::conditions::TriggerConditions;
use super::escalation::EscalationPolicy;
use super::preferences::{DndWindow, UserNotificationPreferences};
use super::severity::Severity;
use crate::database::models::{
    ChannelDbModel, EventDbModel, UserDbModel, UserNotificationPreferencesDbModel,
    WorkflowDbModel,
};
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::{Error, Result};

/// Immutable detection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub organization_id: String,
    pub event_type: String,
    pub severity: Severity,
    pub confidence: f64,
    pub zone_name: Option<String>,
    pub camera_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Notification title, e.g. "Critical Alert: intrusion".
    pub fn alert_title(&self) -> String {
        format!("{} Alert: {}", self.severity.label(), self.event_type)
    }

    /// Notification description, e.g. "Person detected at Lobby".
    pub fn alert_description(&self) -> String {
        format!("{} at {}", self.description, self.camera_name)
    }

    pub fn to_db_model(&self) -> EventDbModel {
        EventDbModel {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            event_type: self.event_type.clone(),
            severity: self.severity.as_str().to_string(),
            confidence: self.confidence,
            zone_name: self.zone_name.clone(),
            camera_name: self.camera_name.clone(),
            description: self.description.clone(),
            created_at: datetime_to_ms(self.created_at),
        }
    }
}

impl TryFrom<EventDbModel> for Event {
    type Error = Error;

    fn try_from(model: EventDbModel) -> Result<Self> {
        let severity = Severity::parse(&model.severity).ok_or_else(|| {
            Error::validation(format!(
                "event {} has unknown severity '{}'",
                model.id, model.severity
            ))
        })?;

        Ok(Self {
            id: model.id,
            organization_id: model.organization_id,
            event_type: model.event_type,
            severity,
            confidence: model.confidence,
            zone_name: model.zone_name,
            camera_name: model.camera_name,
            description: model.description,
            created_at: ms_to_datetime(model.created_at),
        })
    }
}

/// Organization-scoped alerting rule.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub is_active: bool,
    pub trigger_conditions: TriggerConditions,
    pub escalation_policy: EscalationPolicy,
    pub use_user_preferences: bool,
}

impl Workflow {
    /// Whether this workflow fires for `event`.
    pub fn matches(&self, event: &Event) -> bool {
        self.trigger_conditions.matches(event)
    }
}

impl TryFrom<WorkflowDbModel> for Workflow {
    type Error = Error;

    fn try_from(model: WorkflowDbModel) -> Result<Self> {
        let trigger_conditions = TriggerConditions::from_json(model.trigger_conditions.as_deref())?;
        let escalation_policy = EscalationPolicy::from_json(&model.escalation_policy)?;

        Ok(Self {
            id: model.id,
            organization_id: model.organization_id,
            name: model.name,
            is_active: model.is_active,
            trigger_conditions,
            escalation_policy,
            use_user_preferences: model.use_user_preferences,
        })
    }
}

/// Configured notification destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub organization_id: String,
    pub channel_type: String,
    pub channel_name: String,
    pub is_active: bool,
    pub configuration: Map<String, Value>,
}

impl Channel {
    /// Read a configuration field as text. Blank strings count as missing.
    pub fn config_value(&self, key: &str) -> Option<String> {
        match self.configuration.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Read a configuration field holding a `{name: value}` header map.
    pub fn config_headers(&self, key: &str) -> Vec<(String, String)> {
        let Some(Value::Object(map)) = self.configuration.get(key) else {
            return Vec::new();
        };

        let mut headers: Vec<(String, String)> = map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect();
        headers.sort();
        headers
    }
}

impl TryFrom<ChannelDbModel> for Channel {
    type Error = Error;

    fn try_from(model: ChannelDbModel) -> Result<Self> {
        let configuration = match serde_json::from_str::<Value>(&model.channel_configuration)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::validation(format!(
                    "channel {} configuration must be an object, got {}",
                    model.id, other
                )));
            }
        };

        Ok(Self {
            id: model.id,
            organization_id: model.organization_id,
            channel_type: model.channel_type.trim().to_ascii_lowercase(),
            channel_name: model.channel_name,
            is_active: model.is_active,
            configuration,
        })
    }
}

/// Organization member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub organization_id: String,
    pub email: String,
    pub full_name: Option<String>,
}

impl From<UserDbModel> for User {
    fn from(model: UserDbModel) -> Self {
        Self {
            id: model.id,
            organization_id: model.organization_id,
            email: model.email,
            full_name: model.full_name,
        }
    }
}

impl TryFrom<UserNotificationPreferencesDbModel> for UserNotificationPreferences {
    type Error = Error;

    fn try_from(model: UserNotificationPreferencesDbModel) -> Result<Self> {
        let severity_threshold = Severity::parse(&model.severity_threshold).ok_or_else(|| {
            Error::validation(format!(
                "preferences of user {} have unknown severity_threshold '{}'",
                model.user_id, model.severity_threshold
            ))
        })?;
        let blocked_channels: Vec<String> = serde_json::from_str(&model.blocked_channels)?;
        let do_not_disturb_windows: Vec<DndWindow> =
            serde_json::from_str(&model.do_not_disturb_windows)?;

        Ok(Self {
            user_id: model.user_id,
            organization_id: model.organization_id,
            mute_alerts: model.mute_alerts,
            severity_threshold,
            blocked_channels,
            do_not_disturb_windows,
        })
    }
}

impl UserNotificationPreferences {
    pub fn to_db_model(&self) -> Result<UserNotificationPreferencesDbModel> {
        Ok(UserNotificationPreferencesDbModel {
            user_id: self.user_id.clone(),
            organization_id: self.organization_id.clone(),
            mute_alerts: self.mute_alerts,
            severity_threshold: self.severity_threshold.as_str().to_string(),
            blocked_channels: serde_json::to_string(&self.blocked_channels)?,
            do_not_disturb_windows: serde_json::to_string(&self.do_not_disturb_windows)?,
        })
    }
}
