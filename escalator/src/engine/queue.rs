//! Durable delayed dispatch queue.
//!
//! A delayed escalation step is a `pending` notification record with a
//! `scheduled_for` timestamp; nothing is kept in memory. Due records are
//! leased with a visibility timeout so overlapping sweeps do not process
//! the same record, and a crashed sweep's lease simply expires. Every
//! terminal transition updates the same row by id, which releases the lease.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};
use crate::database::models::{NotificationDbModel, NotificationStatus, NotificationUpdate};
use crate::database::repositories::NotificationRepository;
use crate::database::time::datetime_to_ms;
use crate::domain::{Channel, Event, Workflow};

pub struct DelayedDispatchQueue {
    notifications: Arc<dyn NotificationRepository>,
    claim_timeout: chrono::Duration,
}

impl DelayedDispatchQueue {
    pub fn new(notifications: Arc<dyn NotificationRepository>, claim_timeout: std::time::Duration) -> Self {
        Self {
            notifications,
            claim_timeout: chrono::Duration::from_std(claim_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Persist a pending record for `channel`, due `delay` after `now`.
    /// Returns the record id.
    pub async fn schedule(
        &self,
        event: &Event,
        workflow: &Workflow,
        channel: &Channel,
        step_index: usize,
        delay: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let now_ms = datetime_to_ms(now);
        let due = now.checked_add_signed(delay).ok_or_else(|| {
            Error::validation(format!("escalation step {} delay overflows", step_index))
        })?;
        let record = NotificationDbModel {
            id: Uuid::new_v4().to_string(),
            organization_id: event.organization_id.clone(),
            user_id: None,
            event_id: event.id.clone(),
            workflow_id: workflow.id.clone(),
            channel_id: channel.id.clone(),
            notification_type: channel.channel_type.clone(),
            title: event.alert_title(),
            description: event.alert_description(),
            severity: event.severity.as_str().to_string(),
            status: NotificationStatus::Pending.as_str().to_string(),
            delivery_error: None,
            message_content: None,
            escalation_step: step_index as i64,
            scheduled_for: Some(datetime_to_ms(due)),
            sent_at: None,
            claimed_until: None,
            created_at: now_ms,
            updated_at: now_ms,
        };

        self.notifications.create_notification(&record).await?;
        debug!(
            notification_id = %record.id,
            event_id = %event.id,
            channel_id = %channel.id,
            step = step_index,
            scheduled_for = %due,
            "Escalation step scheduled"
        );
        Ok(record.id)
    }

    /// Lease up to `limit` records due at `now`, oldest due first.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<NotificationDbModel>> {
        let claim_until = now + self.claim_timeout;
        self.notifications
            .claim_due(datetime_to_ms(now), datetime_to_ms(claim_until), i64::from(limit))
            .await
    }

    /// Re-check that this sweep still holds the lease on `record` and push it
    /// out by a full claim timeout from `now`. `false` means the record was
    /// finished or re-claimed by another sweep and must not be dispatched.
    pub async fn renew(&self, record: &NotificationDbModel, now: DateTime<Utc>) -> Result<bool> {
        let Some(claimed_until) = record.claimed_until else {
            return Ok(false);
        };
        let until = now + self.claim_timeout;
        self.notifications
            .renew_claim(&record.id, claimed_until, datetime_to_ms(until))
            .await
    }

    /// Move a claimed record straight to `failed` without dispatching it.
    pub async fn fail(&self, notification_id: &str, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let update = NotificationUpdate {
            status: NotificationStatus::Failed,
            delivery_error: Some(error.into()),
            message_content: None,
            user_id: None,
            sent_at: None,
            updated_at: datetime_to_ms(now),
        };
        self.notifications
            .update_notification(notification_id, &update)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::channels::test_support::{RecordingNotifications, channel, event, workflow};
    use serde_json::json;

    #[tokio::test]
    async fn test_schedule_writes_pending_record() {
        let repo = Arc::new(RecordingNotifications::default());
        let queue = DelayedDispatchQueue::new(repo.clone(), std::time::Duration::from_secs(300));
        let (event, workflow) = (event(), workflow());
        let channel = channel("sms", json!({"phone_number": "+15550100"}));

        let id = queue
            .schedule(&event, &workflow, &channel, 1, chrono::Duration::minutes(15), event.created_at)
            .await
            .unwrap();

        let created = repo.created.lock().await;
        let record = &created[0];
        assert_eq!(record.id, id);
        assert_eq!(record.status, "pending");
        assert_eq!(record.escalation_step, 1);
        assert_eq!(record.notification_type, "sms");
        assert_eq!(
            record.scheduled_for,
            Some(datetime_to_ms(event.created_at) + 15 * 60 * 1000)
        );
        assert_eq!(record.sent_at, None);
    }

    #[tokio::test]
    async fn test_fail_updates_in_place() {
        let repo = Arc::new(RecordingNotifications::default());
        let queue = DelayedDispatchQueue::new(repo.clone(), std::time::Duration::from_secs(300));

        queue.fail("n-1", "event e9 not found", Utc::now()).await.unwrap();

        let updated = repo.updated.lock().await;
        assert_eq!(updated[0].0, "n-1");
        assert_eq!(updated[0].1.status, NotificationStatus::Failed);
        assert_eq!(updated[0].1.delivery_error.as_deref(), Some("event e9 not found"));
        assert!(repo.created.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_renew_requires_a_live_lease() {
        let repo = Arc::new(RecordingNotifications::default());
        let queue = DelayedDispatchQueue::new(repo.clone(), std::time::Duration::from_secs(300));
        let (event, workflow) = (event(), workflow());
        let channel = channel("sms", json!({"phone_number": "+15550100"}));
        queue
            .schedule(&event, &workflow, &channel, 1, chrono::Duration::minutes(15), event.created_at)
            .await
            .unwrap();
        let mut record = repo.created.lock().await[0].clone();

        // Never claimed
        assert!(!queue.renew(&record, event.created_at).await.unwrap());

        record.claimed_until = Some(datetime_to_ms(event.created_at));
        assert!(queue.renew(&record, event.created_at).await.unwrap());

        let finished = Arc::new(RecordingNotifications {
            finished: true,
            ..Default::default()
        });
        let queue = DelayedDispatchQueue::new(finished, std::time::Duration::from_secs(300));
        assert!(!queue.renew(&record, event.created_at).await.unwrap());
    }
}
