//! Notification audit logger.
//!
//! Writes one audit record per delivery attempt, or updates the pending
//! record a delayed step created. Failures to write are reported and
//! swallowed so they never abort a dispatch loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::channels::DeliveryOutcome;
use crate::database::models::{NotificationDbModel, NotificationStatus, NotificationUpdate};
use crate::database::repositories::NotificationRepository;
use crate::database::time::datetime_to_ms;
use crate::domain::{Channel, Event, Workflow};

/// One audit entry to write.
#[derive(Debug, Clone)]
pub struct LogEntry<'a> {
    pub event: &'a Event,
    pub workflow: &'a Workflow,
    pub channel_id: &'a str,
    pub notification_type: &'a str,
    pub step_index: usize,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub content: Option<Value>,
    pub user_id: Option<String>,
    /// Existing record to update instead of creating a new one.
    pub notification_id: Option<&'a str>,
    pub at: DateTime<Utc>,
}

impl<'a> LogEntry<'a> {
    /// Entry for a resolved channel. Status defaults to `failed` until an
    /// outcome is attached.
    pub fn for_channel(
        event: &'a Event,
        workflow: &'a Workflow,
        channel: &'a Channel,
        step_index: usize,
        at: DateTime<Utc>,
    ) -> Self {
        Self::for_channel_id(
            event,
            workflow,
            &channel.id,
            &channel.channel_type,
            step_index,
            at,
        )
    }

    /// Entry for a channel known only by id, e.g. one that no longer exists.
    pub fn for_channel_id(
        event: &'a Event,
        workflow: &'a Workflow,
        channel_id: &'a str,
        notification_type: &'a str,
        step_index: usize,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            workflow,
            channel_id,
            notification_type,
            step_index,
            status: NotificationStatus::Failed,
            error: None,
            content: None,
            user_id: None,
            notification_id: None,
            at,
        }
    }

    pub fn outcome(mut self, outcome: DeliveryOutcome) -> Self {
        self.status = outcome.status;
        self.error = outcome.error;
        self.content = outcome.content;
        self.user_id = outcome.user_id;
        self
    }

    pub fn updating(mut self, notification_id: Option<&'a str>) -> Self {
        self.notification_id = notification_id;
        self
    }
}

pub struct NotificationLogger {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationLogger {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Write `entry`. Returns whether the record was persisted.
    pub async fn log(&self, entry: LogEntry<'_>) -> bool {
        let at_ms = datetime_to_ms(entry.at);
        let sent_at = (entry.status == NotificationStatus::Sent).then_some(at_ms);
        let message_content = entry.content.as_ref().map(Value::to_string);

        let result = match entry.notification_id {
            Some(id) => {
                let update = NotificationUpdate {
                    status: entry.status,
                    delivery_error: entry.error.clone(),
                    message_content,
                    user_id: entry.user_id.clone(),
                    sent_at,
                    updated_at: at_ms,
                };
                self.notifications.update_notification(id, &update).await
            }
            None => {
                let record = NotificationDbModel {
                    id: Uuid::new_v4().to_string(),
                    organization_id: entry.event.organization_id.clone(),
                    user_id: entry.user_id.clone(),
                    event_id: entry.event.id.clone(),
                    workflow_id: entry.workflow.id.clone(),
                    channel_id: entry.channel_id.to_string(),
                    notification_type: entry.notification_type.to_string(),
                    title: entry.event.alert_title(),
                    description: entry.event.alert_description(),
                    severity: entry.event.severity.as_str().to_string(),
                    status: entry.status.as_str().to_string(),
                    delivery_error: entry.error.clone(),
                    message_content,
                    escalation_step: entry.step_index as i64,
                    scheduled_for: None,
                    sent_at,
                    claimed_until: None,
                    created_at: at_ms,
                    updated_at: at_ms,
                };
                self.notifications.create_notification(&record).await
            }
        };

        match result {
            Ok(()) => {
                debug!(
                    event_id = %entry.event.id,
                    workflow_id = %entry.workflow.id,
                    channel_id = %entry.channel_id,
                    notification_id = ?entry.notification_id,
                    step = entry.step_index,
                    status = %entry.status,
                    "Notification logged"
                );
                true
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    event_id = %entry.event.id,
                    channel_id = %entry.channel_id,
                    notification_id = ?entry.notification_id,
                    status = %entry.status,
                    error = %e,
                    "Lease lost; record already finished elsewhere, outcome discarded"
                );
                false
            }
            Err(e) => {
                error!(
                    event_id = %entry.event.id,
                    workflow_id = %entry.workflow.id,
                    channel_id = %entry.channel_id,
                    notification_id = ?entry.notification_id,
                    status = %entry.status,
                    error = %e,
                    "CRITICAL: failed to write notification audit record"
                );
                false
            }
        }
    }
}
