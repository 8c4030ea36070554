//! Notification audit record repository.
//!
//! Every write goes through [`retry_on_sqlite_busy`] since event processing
//! and the sweeper write to this table concurrently.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{NotificationDbModel, NotificationStatus, NotificationUpdate};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Notification repository trait.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(&self, notification: &NotificationDbModel) -> Result<()>;
    /// Move a `pending` record to its outcome and release any sweeper lease
    /// on it. A record that is no longer pending is left untouched and
    /// reported as [`Error::Conflict`]; a missing one as `NotFound`.
    async fn update_notification(&self, id: &str, update: &NotificationUpdate) -> Result<()>;
    async fn get_notification(&self, id: &str) -> Result<NotificationDbModel>;
    /// All records written for one event, in creation order.
    async fn list_for_event(&self, event_id: &str) -> Result<Vec<NotificationDbModel>>;
    /// Lease up to `limit` pending records whose `scheduled_for` is at or
    /// before `now_ms`. Records stay leased until `claim_until_ms`, after
    /// which another sweep may claim them again.
    async fn claim_due(
        &self,
        now_ms: i64,
        claim_until_ms: i64,
        limit: i64,
    ) -> Result<Vec<NotificationDbModel>>;
    /// Extend a lease still held at `claimed_until_ms` to `new_until_ms`.
    /// Returns `false` when the record was finished or re-claimed meanwhile.
    async fn renew_claim(&self, id: &str, claimed_until_ms: i64, new_until_ms: i64) -> Result<bool>;
}

/// SQLx implementation of NotificationRepository.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create_notification(&self, n: &NotificationDbModel) -> Result<()> {
        retry_on_sqlite_busy("create_notification", || async {
            sqlx::query(
                r#"
                INSERT INTO notifications (
                    id, organization_id, user_id, event_id, workflow_id, channel_id,
                    notification_type, title, description, severity, status,
                    delivery_error, message_content, escalation_step, scheduled_for,
                    sent_at, claimed_until, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&n.id)
            .bind(&n.organization_id)
            .bind(&n.user_id)
            .bind(&n.event_id)
            .bind(&n.workflow_id)
            .bind(&n.channel_id)
            .bind(&n.notification_type)
            .bind(&n.title)
            .bind(&n.description)
            .bind(&n.severity)
            .bind(&n.status)
            .bind(&n.delivery_error)
            .bind(&n.message_content)
            .bind(n.escalation_step)
            .bind(n.scheduled_for)
            .bind(n.sent_at)
            .bind(n.claimed_until)
            .bind(n.created_at)
            .bind(n.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_notification(&self, id: &str, update: &NotificationUpdate) -> Result<()> {
        let rows = retry_on_sqlite_busy("update_notification", || async {
            let result = sqlx::query(
                r#"
                UPDATE notifications SET
                    status = ?,
                    delivery_error = ?,
                    message_content = COALESCE(?, message_content),
                    user_id = COALESCE(?, user_id),
                    sent_at = ?,
                    claimed_until = NULL,
                    updated_at = ?
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(update.status.as_str())
            .bind(&update.delivery_error)
            .bind(&update.message_content)
            .bind(&update.user_id)
            .bind(update.sent_at)
            .bind(update.updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if rows == 0 {
            let current = self.get_notification(id).await?;
            return Err(Error::conflict(format!(
                "notification {} is already {}",
                id, current.status
            )));
        }
        Ok(())
    }

    async fn renew_claim(&self, id: &str, claimed_until_ms: i64, new_until_ms: i64) -> Result<bool> {
        let rows = retry_on_sqlite_busy("renew_claim", || async {
            let result = sqlx::query(
                r#"
                UPDATE notifications SET claimed_until = ?
                WHERE id = ? AND status = 'pending' AND claimed_until = ?
                "#,
            )
            .bind(new_until_ms)
            .bind(id)
            .bind(claimed_until_ms)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;
        Ok(rows == 1)
    }

    async fn get_notification(&self, id: &str) -> Result<NotificationDbModel> {
        sqlx::query_as::<_, NotificationDbModel>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Notification", id))
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<NotificationDbModel>> {
        let notifications = sqlx::query_as::<_, NotificationDbModel>(
            "SELECT * FROM notifications WHERE event_id = ? ORDER BY created_at, rowid",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    async fn claim_due(
        &self,
        now_ms: i64,
        claim_until_ms: i64,
        limit: i64,
    ) -> Result<Vec<NotificationDbModel>> {
        let mut claimed = retry_on_sqlite_busy("claim_due_notifications", || async {
            let rows = sqlx::query_as::<_, NotificationDbModel>(
                r#"
                UPDATE notifications SET claimed_until = ?
                WHERE id IN (
                    SELECT id FROM notifications
                    WHERE status = ?
                      AND scheduled_for IS NOT NULL
                      AND scheduled_for <= ?
                      AND (claimed_until IS NULL OR claimed_until <= ?)
                    ORDER BY scheduled_for, created_at
                    LIMIT ?
                )
                RETURNING *
                "#,
            )
            .bind(claim_until_ms)
            .bind(NotificationStatus::Pending.as_str())
            .bind(now_ms)
            .bind(now_ms)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await?;

        // RETURNING order is unspecified
        claimed.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(claimed)
    }
}
