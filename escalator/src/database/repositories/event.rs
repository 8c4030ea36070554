//! Event repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::EventDbModel;
use crate::{Error, Result};

/// Event repository trait.
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn get_event(&self, id: &str) -> Result<EventDbModel>;
    async fn create_event(&self, event: &EventDbModel) -> Result<()>;
}

/// SQLx implementation of EventRepository.
pub struct SqlxEventRepository {
    pool: SqlitePool,
}

impl SqlxEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn get_event(&self, id: &str) -> Result<EventDbModel> {
        sqlx::query_as::<_, EventDbModel>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Event", id))
    }

    async fn create_event(&self, event: &EventDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (
                id, organization_id, event_type, severity, confidence,
                zone_name, camera_name, description, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.organization_id)
        .bind(&event.event_type)
        .bind(&event.severity)
        .bind(event.confidence)
        .bind(&event.zone_name)
        .bind(&event.camera_name)
        .bind(&event.description)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
