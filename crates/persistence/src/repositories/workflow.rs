//! Workflow repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{TriggerType, Workflow};
use domain::stores::{StoreError, WorkflowStore};
use shared::pagination::PageRequest;
use sqlx::PgPool;

use super::map_unique_violation;
use crate::entities::{WorkflowEntity, WorkflowJson};
use crate::metrics::QueryTimer;

/// Repository for marketing workflow database operations.
#[derive(Clone)]
pub struct WorkflowRepository {
    pool: PgPool,
}

impl WorkflowRepository {
    /// Creates a new WorkflowRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl WorkflowStore for WorkflowRepository {
    async fn create(&self, workflow: &Workflow) -> Result<Workflow, StoreError> {
        let json = WorkflowJson::from_domain(workflow)?;
        let timer = QueryTimer::new("create_workflow");

        let result = sqlx::query_as::<_, WorkflowEntity>(
            r#"
            INSERT INTO workflows (
                shop_id, staff_id, title, description, is_active, audience,
                trigger_type, trigger_category, trigger_config, action_type, action_config,
                next_scheduled_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING id, shop_id, staff_id, title, description, is_active, audience,
                      trigger_type, trigger_category, trigger_config, action_type, action_config,
                      execution_count, success_count, failure_count, last_executed_at,
                      next_scheduled_at, created_at, updated_at, deleted_at
            "#,
        )
        .bind(workflow.shop_id)
        .bind(workflow.staff_id)
        .bind(&workflow.title)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(&json.audience)
        .bind(workflow.trigger_type().as_str())
        .bind(workflow.trigger_category().as_str())
        .bind(&json.trigger_config)
        .bind(workflow.action_type().as_str())
        .bind(&json.action_config)
        .bind(workflow.next_scheduled_at)
        .bind(workflow.created_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| map_unique_violation(e, "workflow title"))?
            .into_domain()
    }

    async fn update(&self, workflow: &Workflow) -> Result<Workflow, StoreError> {
        let json = WorkflowJson::from_domain(workflow)?;
        let timer = QueryTimer::new("update_workflow");

        let result = sqlx::query_as::<_, WorkflowEntity>(
            r#"
            UPDATE workflows
            SET title = $2,
                description = $3,
                is_active = $4,
                audience = $5,
                trigger_type = $6,
                trigger_category = $7,
                trigger_config = $8,
                action_type = $9,
                action_config = $10,
                next_scheduled_at = $11,
                updated_at = $12,
                deleted_at = $13
            WHERE id = $1
            RETURNING id, shop_id, staff_id, title, description, is_active, audience,
                      trigger_type, trigger_category, trigger_config, action_type, action_config,
                      execution_count, success_count, failure_count, last_executed_at,
                      next_scheduled_at, created_at, updated_at, deleted_at
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.title)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(&json.audience)
        .bind(workflow.trigger_type().as_str())
        .bind(workflow.trigger_category().as_str())
        .bind(&json.trigger_config)
        .bind(workflow.action_type().as_str())
        .bind(&json.action_config)
        .bind(workflow.next_scheduled_at)
        .bind(workflow.updated_at)
        .bind(workflow.deleted_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| map_unique_violation(e, "workflow title"))?
            .into_domain()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Workflow>, StoreError> {
        let timer = QueryTimer::new("find_workflow_by_id");
        let result = sqlx::query_as::<_, WorkflowEntity>(
            r#"
            SELECT id, shop_id, staff_id, title, description, is_active, audience,
                   trigger_type, trigger_category, trigger_config, action_type, action_config,
                   execution_count, success_count, failure_count, last_executed_at,
                   next_scheduled_at, created_at, updated_at, deleted_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result?.map(WorkflowEntity::into_domain).transpose()
    }

    async fn title_exists(
        &self,
        shop_id: i64,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("workflow_title_exists");
        let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM workflows
                WHERE shop_id = $1
                  AND title = $2
                  AND deleted_at IS NULL
                  AND ($3::bigint IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(shop_id)
        .bind(title)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        Ok(result?.0)
    }

    async fn list_for_shop(
        &self,
        shop_id: i64,
        active_only: bool,
        page: &PageRequest,
    ) -> Result<Vec<Workflow>, StoreError> {
        let timer = QueryTimer::new("list_workflows_for_shop");
        let (cursor_at, cursor_id) = match page.cursor {
            Some(c) => (Some(c.created_at), Some(c.id)),
            None => (None, None),
        };

        let result = sqlx::query_as::<_, WorkflowEntity>(
            r#"
            SELECT id, shop_id, staff_id, title, description, is_active, audience,
                   trigger_type, trigger_category, trigger_config, action_type, action_config,
                   execution_count, success_count, failure_count, last_executed_at,
                   next_scheduled_at, created_at, updated_at, deleted_at
            FROM workflows
            WHERE shop_id = $1
              AND deleted_at IS NULL
              AND (NOT $2 OR is_active)
              AND ($3::timestamptz IS NULL OR (created_at, id) < ($3, $4))
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(shop_id)
        .bind(active_only)
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(page.fetch_limit())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?.into_iter().map(WorkflowEntity::into_domain).collect()
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Workflow>, StoreError> {
        let timer = QueryTimer::new("find_due_workflows");
        let result = sqlx::query_as::<_, WorkflowEntity>(
            r#"
            SELECT id, shop_id, staff_id, title, description, is_active, audience,
                   trigger_type, trigger_category, trigger_config, action_type, action_config,
                   execution_count, success_count, failure_count, last_executed_at,
                   next_scheduled_at, created_at, updated_at, deleted_at
            FROM workflows
            WHERE is_active
              AND deleted_at IS NULL
              AND next_scheduled_at <= $1
            ORDER BY next_scheduled_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?.into_iter().map(WorkflowEntity::into_domain).collect()
    }

    async fn find_unscheduled(
        &self,
        trigger_types: &[TriggerType],
        limit: i64,
    ) -> Result<Vec<Workflow>, StoreError> {
        let codes: Vec<&str> = trigger_types.iter().map(|t| t.as_str()).collect();
        let timer = QueryTimer::new("find_unscheduled_workflows");
        let result = sqlx::query_as::<_, WorkflowEntity>(
            r#"
            SELECT id, shop_id, staff_id, title, description, is_active, audience,
                   trigger_type, trigger_category, trigger_config, action_type, action_config,
                   execution_count, success_count, failure_count, last_executed_at,
                   next_scheduled_at, created_at, updated_at, deleted_at
            FROM workflows
            WHERE is_active
              AND deleted_at IS NULL
              AND next_scheduled_at IS NULL
              AND trigger_type = ANY($1)
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(&codes)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?.into_iter().map(WorkflowEntity::into_domain).collect()
    }

    async fn record_execution(
        &self,
        id: i64,
        success: bool,
        executed_at: DateTime<Utc>,
        next_scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("record_workflow_execution");
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET execution_count = execution_count + 1,
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_executed_at = $3,
                next_scheduled_at = $4,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(success)
        .bind(executed_at)
        .bind(next_scheduled_at)
        .execute(&self.pool)
        .await;
        timer.record();

        result?;
        Ok(())
    }
}
