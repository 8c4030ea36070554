//! Channel repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ChannelDbModel;
use crate::{Error, Result};

/// Channel repository trait.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel>;
    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()>;
    async fn set_channel_active(&self, id: &str, is_active: bool) -> Result<()>;
}

/// SQLx implementation of ChannelRepository.
pub struct SqlxChannelRepository {
    pool: SqlitePool,
}

impl SqlxChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqlxChannelRepository {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel> {
        sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Channel", id))
    }

    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO channels (
                id, organization_id, channel_type, channel_name, is_active, channel_configuration
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.organization_id)
        .bind(&channel.channel_type)
        .bind(&channel.channel_name)
        .bind(channel.is_active)
        .bind(&channel.channel_configuration)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_channel_active(&self, id: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE channels SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Channel", id));
        }
        Ok(())
    }
}
