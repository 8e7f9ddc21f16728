//! Workflow commands and queries.

use std::sync::Arc;

use chrono::Utc;
use domain::models::workflow::WorkflowRequest;
use domain::models::{Workflow, WorkflowExecution};
use domain::services::ShopDirectory;
use domain::stores::{StoreError, WorkflowExecutionStore, WorkflowStore};
use domain::{DomainError, DomainResult};
use shared::pagination::{Page, PageCursor, PageRequest};
use tracing::info;
use validator::Validate;

use super::{Dependencies, WorkflowRunner};

pub struct WorkflowService {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn WorkflowExecutionStore>,
    shops: Arc<dyn ShopDirectory>,
    runner: Arc<WorkflowRunner>,
}

fn title_conflict(title: &str) -> DomainError {
    DomainError::Conflict(format!("Workflow title '{}' is already in use", title))
}

impl WorkflowService {
    pub fn new(deps: &Dependencies, runner: Arc<WorkflowRunner>) -> Self {
        Self {
            workflows: deps.workflows.clone(),
            executions: deps.executions.clone(),
            shops: deps.shops.clone(),
            runner,
        }
    }

    pub async fn create(
        &self,
        shop_id: i64,
        staff_id: i64,
        request: WorkflowRequest,
    ) -> DomainResult<Workflow> {
        request.validate()?;
        let start_active = request.is_active.unwrap_or(true);
        let definition = request.into_definition()?;

        if !self.shops.exists(shop_id).await? {
            return Err(DomainError::not_found("Shop", shop_id));
        }
        if self
            .workflows
            .title_exists(shop_id, &definition.title, None)
            .await?
        {
            return Err(title_conflict(&definition.title));
        }

        let now = Utc::now();
        let mut workflow = Workflow::new(shop_id, staff_id, definition, now);
        if !start_active {
            workflow.deactivate(now)?;
        }

        // The unique index still guards against a concurrent create.
        let created = self.workflows.create(&workflow).await.map_err(|e| match e {
            StoreError::Duplicate(_) => title_conflict(&workflow.title),
            other => other.into(),
        })?;

        info!(
            workflow_id = created.id,
            shop_id = shop_id,
            staff_id = staff_id,
            trigger_type = %created.trigger_type(),
            action_type = %created.action_type(),
            "Workflow created"
        );
        Ok(created)
    }

    /// A live workflow of the shop.
    pub async fn get(&self, shop_id: i64, id: i64) -> DomainResult<Workflow> {
        self.workflows
            .find_by_id(id)
            .await?
            .filter(|w| w.belongs_to_shop(shop_id) && !w.is_deleted())
            .ok_or_else(|| DomainError::not_found("Workflow", id))
    }

    /// Like [`get`](Self::get) but also returns deleted rows, so that
    /// commands on them fail with a conflict instead of a 404.
    async fn load_for_command(&self, shop_id: i64, staff_id: i64, id: i64) -> DomainResult<Workflow> {
        let workflow = self
            .workflows
            .find_by_id(id)
            .await?
            .filter(|w| w.belongs_to_shop(shop_id))
            .ok_or_else(|| DomainError::not_found("Workflow", id))?;

        if !workflow.is_owned_by(staff_id) {
            return Err(DomainError::Forbidden(format!(
                "Staff {} does not own workflow {}",
                staff_id, id
            )));
        }
        Ok(workflow)
    }

    pub async fn update(
        &self,
        shop_id: i64,
        staff_id: i64,
        id: i64,
        request: WorkflowRequest,
    ) -> DomainResult<Workflow> {
        request.validate()?;
        let definition = request.into_definition()?;
        let mut workflow = self.load_for_command(shop_id, staff_id, id).await?;

        if self
            .workflows
            .title_exists(shop_id, &definition.title, Some(id))
            .await?
        {
            return Err(title_conflict(&definition.title));
        }

        workflow.redefine(definition, Utc::now())?;
        let updated = self.workflows.update(&workflow).await.map_err(|e| match e {
            StoreError::Duplicate(_) => title_conflict(&workflow.title),
            other => other.into(),
        })?;

        info!(workflow_id = id, shop_id = shop_id, "Workflow updated");
        Ok(updated)
    }

    /// Soft delete; the row and its history are kept.
    pub async fn delete(&self, shop_id: i64, staff_id: i64, id: i64) -> DomainResult<()> {
        let mut workflow = self.load_for_command(shop_id, staff_id, id).await?;
        workflow.soft_delete(Utc::now())?;
        self.workflows.update(&workflow).await?;

        info!(workflow_id = id, shop_id = shop_id, "Workflow deleted");
        Ok(())
    }

    pub async fn activate(&self, shop_id: i64, id: i64) -> DomainResult<Workflow> {
        let mut workflow = self.find_in_shop(shop_id, id).await?;
        workflow.activate(Utc::now())?;
        Ok(self.workflows.update(&workflow).await?)
    }

    pub async fn deactivate(&self, shop_id: i64, id: i64) -> DomainResult<Workflow> {
        let mut workflow = self.find_in_shop(shop_id, id).await?;
        workflow.deactivate(Utc::now())?;
        Ok(self.workflows.update(&workflow).await?)
    }

    async fn find_in_shop(&self, shop_id: i64, id: i64) -> DomainResult<Workflow> {
        self.workflows
            .find_by_id(id)
            .await?
            .filter(|w| w.belongs_to_shop(shop_id))
            .ok_or_else(|| DomainError::not_found("Workflow", id))
    }

    pub async fn list(
        &self,
        shop_id: i64,
        active_only: bool,
        page: PageRequest,
    ) -> DomainResult<Page<Workflow>> {
        let rows = self
            .workflows
            .list_for_shop(shop_id, active_only, &page)
            .await?;
        Ok(Page::from_rows(rows, &page, |w| {
            PageCursor::new(w.created_at, w.id)
        }))
    }

    pub async fn list_executions(
        &self,
        shop_id: i64,
        workflow_id: i64,
        page: PageRequest,
    ) -> DomainResult<Page<WorkflowExecution>> {
        self.find_in_shop(shop_id, workflow_id).await?;
        let rows = self
            .executions
            .list_for_workflow(workflow_id, &page)
            .await?;
        Ok(Page::from_rows(rows, &page, |e| {
            PageCursor::new(e.created_at, e.id)
        }))
    }

    /// Runs the workflow now, outside its schedule.
    pub async fn run(&self, shop_id: i64, id: i64) -> DomainResult<WorkflowExecution> {
        let workflow = self.get(shop_id, id).await?;
        self.runner
            .execute(&workflow)
            .await?
            .ok_or_else(|| DomainError::Conflict(format!("Workflow {} is not active", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ActionExecutor, MessageService};
    use domain::models::{ExecutionStatus, TriggerType, WorkflowError};
    use domain::services::{LoggingNotificationSink, MockSmsGateway};
    use persistence::memory::{DirectoryCustomer, InMemoryDirectory};

    async fn service() -> WorkflowService {
        let directory = InMemoryDirectory::new();
        directory.add_shop(1, "Glow").await;
        directory
            .add_customer(DirectoryCustomer {
                id: 10,
                shop_id: 1,
                ..Default::default()
            })
            .await;
        let deps = Dependencies::in_memory(directory, Arc::new(MockSmsGateway::new()))
            .with_notifications(Arc::new(LoggingNotificationSink::new()));
        let messages = Arc::new(MessageService::new(&deps));
        let runner = Arc::new(WorkflowRunner::new(
            &deps,
            ActionExecutor::new(&deps, messages),
            1000,
        ));
        WorkflowService::new(&deps, runner)
    }

    fn request(title: &str) -> WorkflowRequest {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "triggerType": "visit-cycle",
            "triggerConfig": {"visitCycleDays": 30},
            "actionType": "system-notification",
            "actionConfig": {"notificationTitle": "Due", "notificationContent": "Call"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = service().await;
        let created = service.create(1, 7, request("Cycle")).await.unwrap();

        let fetched = service.get(1, created.id).await.unwrap();
        assert_eq!(fetched.trigger_type(), TriggerType::VisitCycle);
        assert!(fetched.is_active);
        assert!(service.get(2, created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_title() {
        let service = service().await;
        service.create(1, 7, request("Cycle")).await.unwrap();

        let err = service.create(1, 8, request("Cycle")).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_missing_trigger_config() {
        let service = service().await;
        let mut bad = request("Cycle");
        bad.trigger_config.visit_cycle_days = None;

        let err = service.create(1, 7, bad).await.unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_create_inactive() {
        let service = service().await;
        let mut req = request("Paused");
        req.is_active = Some(false);

        let created = service.create(1, 7, req).await.unwrap();
        assert!(!created.is_active);
    }

    #[tokio::test]
    async fn test_update_requires_owner() {
        let service = service().await;
        let created = service.create(1, 7, request("Cycle")).await.unwrap();

        let err = service
            .update(1, 8, created.id, request("Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let updated = service
            .update(1, 7, created.id, request("Renamed"))
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
    }

    #[tokio::test]
    async fn test_update_keeps_own_title_but_not_others() {
        let service = service().await;
        let first = service.create(1, 7, request("First")).await.unwrap();
        service.create(1, 7, request("Second")).await.unwrap();

        assert!(service.update(1, 7, first.id, request("First")).await.is_ok());
        assert!(matches!(
            service
                .update(1, 7, first.id, request("Second"))
                .await
                .unwrap_err(),
            DomainError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_deleted_workflow_rejects_commands() {
        let service = service().await;
        let created = service.create(1, 7, request("Cycle")).await.unwrap();
        service.delete(1, 7, created.id).await.unwrap();

        assert!(matches!(
            service.get(1, created.id).await.unwrap_err(),
            DomainError::NotFound { .. }
        ));
        assert!(matches!(
            service
                .update(1, 7, created.id, request("Again"))
                .await
                .unwrap_err(),
            DomainError::Workflow(WorkflowError::Deleted(_))
        ));
        assert!(matches!(
            service.activate(1, created.id).await.unwrap_err(),
            DomainError::Workflow(WorkflowError::Deleted(_))
        ));

        // The title is free again once deleted.
        assert!(service.create(1, 7, request("Cycle")).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let service = service().await;
        service.create(1, 7, request("A")).await.unwrap();
        let b = service.create(1, 7, request("B")).await.unwrap();
        service.deactivate(1, b.id).await.unwrap();

        let all = service.list(1, false, PageRequest::default()).await.unwrap();
        assert_eq!(all.items.len(), 2);
        let active = service.list(1, true, PageRequest::default()).await.unwrap();
        assert_eq!(active.items.len(), 1);
        assert_eq!(active.items[0].title, "A");
    }

    #[tokio::test]
    async fn test_run_records_execution_history() {
        let service = service().await;
        let created = service.create(1, 7, request("Cycle")).await.unwrap();

        let execution = service.run(1, created.id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.success_count, 1);

        let history = service
            .list_executions(1, created.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(history.items.len(), 1);
        assert_eq!(service.get(1, created.id).await.unwrap().execution_count, 1);
    }

    #[tokio::test]
    async fn test_run_inactive_conflicts() {
        let service = service().await;
        let created = service.create(1, 7, request("Cycle")).await.unwrap();
        service.deactivate(1, created.id).await.unwrap();

        assert!(matches!(
            service.run(1, created.id).await.unwrap_err(),
            DomainError::Conflict(_)
        ));
    }
}
