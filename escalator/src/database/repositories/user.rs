//! User and notification preference repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{UserDbModel, UserNotificationPreferencesDbModel};
use crate::Result;

/// User repository trait.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Members of one organization, ordered by id.
    async fn list_users(&self, organization_id: &str) -> Result<Vec<UserDbModel>>;
    /// Case-insensitive lookup of a member by email address.
    async fn find_user_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> Result<Option<UserDbModel>>;
    async fn create_user(&self, user: &UserDbModel) -> Result<()>;

    async fn get_preferences(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<UserNotificationPreferencesDbModel>>;
    async fn upsert_preferences(&self, prefs: &UserNotificationPreferencesDbModel) -> Result<()>;
}

/// SQLx implementation of UserRepository.
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn list_users(&self, organization_id: &str) -> Result<Vec<UserDbModel>> {
        let users = sqlx::query_as::<_, UserDbModel>(
            "SELECT * FROM users WHERE organization_id = ? ORDER BY id",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_user_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> Result<Option<UserDbModel>> {
        let user = sqlx::query_as::<_, UserDbModel>(
            r#"
            SELECT * FROM users
            WHERE organization_id = ? AND LOWER(email) = LOWER(?)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: &UserDbModel) -> Result<()> {
        sqlx::query("INSERT INTO users (id, organization_id, email, full_name) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.organization_id)
            .bind(&user.email)
            .bind(&user.full_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_preferences(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<UserNotificationPreferencesDbModel>> {
        let prefs = sqlx::query_as::<_, UserNotificationPreferencesDbModel>(
            "SELECT * FROM user_notification_preferences WHERE user_id = ? AND organization_id = ?",
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prefs)
    }

    async fn upsert_preferences(&self, prefs: &UserNotificationPreferencesDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_notification_preferences (
                user_id, organization_id, mute_alerts, severity_threshold,
                blocked_channels, do_not_disturb_windows
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, organization_id) DO UPDATE SET
                mute_alerts = excluded.mute_alerts,
                severity_threshold = excluded.severity_threshold,
                blocked_channels = excluded.blocked_channels,
                do_not_disturb_windows = excluded.do_not_disturb_windows
            "#,
        )
        .bind(&prefs.user_id)
        .bind(&prefs.organization_id)
        .bind(prefs.mute_alerts)
        .bind(&prefs.severity_threshold)
        .bind(&prefs.blocked_channels)
        .bind(&prefs.do_not_disturb_windows)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
