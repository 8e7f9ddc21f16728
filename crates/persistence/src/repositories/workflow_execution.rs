//! Workflow execution repository for database operations.

use domain::models::WorkflowExecution;
use domain::stores::{StoreError, WorkflowExecutionStore};
use shared::pagination::PageRequest;
use sqlx::PgPool;

use crate::entities::WorkflowExecutionEntity;
use crate::metrics::QueryTimer;

/// Repository for workflow execution history.
#[derive(Clone)]
pub struct WorkflowExecutionRepository {
    pool: PgPool,
}

impl WorkflowExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkflowExecutionStore for WorkflowExecutionRepository {
    async fn insert(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution, StoreError> {
        let timer = QueryTimer::new("insert_workflow_execution");
        let result = sqlx::query_as::<_, WorkflowExecutionEntity>(
            r#"
            INSERT INTO workflow_executions (
                workflow_id, shop_id, status, trigger_type, action_type,
                target_count, success_count, failure_count, error_message,
                execution_details, started_at, completed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, workflow_id, shop_id, status, trigger_type, action_type,
                      target_count, success_count, failure_count, error_message,
                      execution_details, started_at, completed_at, created_at
            "#,
        )
        .bind(execution.workflow_id)
        .bind(execution.shop_id)
        .bind(execution.status.as_str())
        .bind(execution.trigger_type.as_str())
        .bind(execution.action_type.as_str())
        .bind(execution.target_count)
        .bind(execution.success_count)
        .bind(execution.failure_count)
        .bind(&execution.error_message)
        .bind(&execution.details)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.created_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result?.into_domain()
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("update_workflow_execution");
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2,
                target_count = $3,
                success_count = $4,
                failure_count = $5,
                error_message = $6,
                execution_details = $7,
                started_at = $8,
                completed_at = $9
            WHERE id = $1
              AND status IN ('SCHEDULED', 'RUNNING')
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(execution.target_count)
        .bind(execution.success_count)
        .bind(execution.failure_count)
        .bind(&execution.error_message)
        .bind(&execution.details)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() > 0)
    }

    async fn list_for_workflow(
        &self,
        workflow_id: i64,
        page: &PageRequest,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let timer = QueryTimer::new("list_workflow_executions");
        let (cursor_at, cursor_id) = match page.cursor {
            Some(c) => (Some(c.created_at), Some(c.id)),
            None => (None, None),
        };

        let result = sqlx::query_as::<_, WorkflowExecutionEntity>(
            r#"
            SELECT id, workflow_id, shop_id, status, trigger_type, action_type,
                   target_count, success_count, failure_count, error_message,
                   execution_details, started_at, completed_at, created_at
            FROM workflow_executions
            WHERE workflow_id = $1
              AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3))
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(workflow_id)
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(page.fetch_limit())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?
            .into_iter()
            .map(WorkflowExecutionEntity::into_domain)
            .collect()
    }
}
