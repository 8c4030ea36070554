//! Workflow repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::WorkflowDbModel;
use crate::{Error, Result};

/// Workflow repository trait.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn get_workflow(&self, id: &str) -> Result<WorkflowDbModel>;
    /// Active workflows of one organization, oldest first.
    async fn list_active_workflows(&self, organization_id: &str) -> Result<Vec<WorkflowDbModel>>;
    async fn create_workflow(&self, workflow: &WorkflowDbModel) -> Result<()>;
}

/// SQLx implementation of WorkflowRepository.
pub struct SqlxWorkflowRepository {
    pool: SqlitePool,
}

impl SqlxWorkflowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for SqlxWorkflowRepository {
    async fn get_workflow(&self, id: &str) -> Result<WorkflowDbModel> {
        sqlx::query_as::<_, WorkflowDbModel>("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Workflow", id))
    }

    async fn list_active_workflows(&self, organization_id: &str) -> Result<Vec<WorkflowDbModel>> {
        let workflows = sqlx::query_as::<_, WorkflowDbModel>(
            r#"
            SELECT * FROM workflows
            WHERE organization_id = ? AND is_active = 1
            ORDER BY created_at, id
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(workflows)
    }

    async fn create_workflow(&self, workflow: &WorkflowDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (
                id, organization_id, name, is_active, trigger_conditions,
                escalation_policy, use_user_preferences, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.organization_id)
        .bind(&workflow.name)
        .bind(workflow.is_active)
        .bind(&workflow.trigger_conditions)
        .bind(&workflow.escalation_policy)
        .bind(workflow.use_user_preferences)
        .bind(workflow.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
