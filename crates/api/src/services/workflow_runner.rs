//! Workflow execution.
//!
//! The runner tracks one firing as a [`WorkflowExecution`] and folds the
//! result into the workflow's counters. The [`ActionExecutor`] performs the
//! configured action for a list of target customers.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use domain::models::message::SendMessageRequest;
use domain::models::{ActionConfig, MessageStatus, SendingType, Workflow, WorkflowExecution};
use domain::services::{
    AudienceSource, CouponValidator, NotificationSink, RecipientDirectory, ShopNotification,
    TemplateSource,
};
use domain::stores::{WorkflowExecutionStore, WorkflowStore};
use domain::{DomainError, DomainResult};
use metrics::counter;
use shared::validation::MAX_RECIPIENTS_PER_REQUEST;
use tracing::{debug, error, info, warn};

use super::{Dependencies, MessageService};

/// Per-recipient tally of one action run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: usize,
    pub failure: usize,
}

impl ActionOutcome {
    fn all_failed(count: usize) -> Self {
        Self {
            success: 0,
            failure: count,
        }
    }
}

/// Sending type and schedule for a message action run at `now`.
///
/// Today's occurrence of `send_time` (UTC) becomes a reservation while it is
/// still ahead; once it has passed the messages go out immediately.
fn delivery_schedule(send_time: NaiveTime, now: DateTime<Utc>) -> (SendingType, Option<DateTime<Utc>>) {
    let at = now.date_naive().and_time(send_time).and_utc();
    if at > now {
        (SendingType::Reservation, Some(at))
    } else {
        (SendingType::Immediate, None)
    }
}

pub struct ActionExecutor {
    templates: Arc<dyn TemplateSource>,
    coupons: Arc<dyn CouponValidator>,
    recipients: Arc<dyn RecipientDirectory>,
    notifications: Arc<dyn NotificationSink>,
    messages: Arc<MessageService>,
}

impl ActionExecutor {
    pub fn new(deps: &Dependencies, messages: Arc<MessageService>) -> Self {
        Self {
            templates: deps.templates.clone(),
            coupons: deps.coupons.clone(),
            recipients: deps.recipients.clone(),
            notifications: deps.notifications.clone(),
            messages,
        }
    }

    pub async fn execute(
        &self,
        workflow: &Workflow,
        targets: &[i64],
        now: DateTime<Utc>,
    ) -> DomainResult<ActionOutcome> {
        match &workflow.action {
            ActionConfig::MessageOnly {
                message_template_id,
                send_time,
                ..
            } => {
                self.send_template(workflow, *message_template_id, *send_time, None, targets, now)
                    .await
            }
            ActionConfig::CouponMessage {
                message_template_id,
                send_time,
                coupon_id,
                ..
            } => {
                if !self.coupons.is_valid(workflow.shop_id, *coupon_id).await? {
                    warn!(
                        workflow_id = workflow.id,
                        shop_id = workflow.shop_id,
                        coupon_id = coupon_id,
                        "Coupon is not valid, failing every target"
                    );
                    return Ok(ActionOutcome::all_failed(targets.len()));
                }
                self.send_template(
                    workflow,
                    *message_template_id,
                    *send_time,
                    Some(*coupon_id),
                    targets,
                    now,
                )
                .await
            }
            ActionConfig::SystemNotification {
                notification_title,
                notification_content,
                notification_level,
            } => {
                let notification = ShopNotification {
                    shop_id: workflow.shop_id,
                    workflow_id: workflow.id,
                    title: notification_title.clone(),
                    content: notification_content.clone(),
                    level: *notification_level,
                    created_at: now,
                };
                let result = self.notifications.notify(&notification).await;
                if result.is_delivered() {
                    Ok(ActionOutcome {
                        success: 1,
                        failure: 0,
                    })
                } else {
                    warn!(workflow_id = workflow.id, result = ?result, "Notification not delivered");
                    Ok(ActionOutcome::all_failed(1))
                }
            }
        }
    }

    async fn send_template(
        &self,
        workflow: &Workflow,
        template_id: i64,
        send_time: NaiveTime,
        coupon_id: Option<i64>,
        targets: &[i64],
        now: DateTime<Utc>,
    ) -> DomainResult<ActionOutcome> {
        let content = self
            .templates
            .template_content(workflow.shop_id, template_id)
            .await?
            .ok_or_else(|| DomainError::not_found("MessageTemplate", template_id))?;

        // Customers without an address would reject the whole send request.
        let addresses = self.recipients.resolve_addresses(targets).await?;
        let reachable: Vec<i64> = targets
            .iter()
            .copied()
            .filter(|id| addresses.contains_key(id))
            .collect();
        let mut outcome = ActionOutcome::all_failed(targets.len() - reachable.len());

        let (sending_type, scheduled_at) = delivery_schedule(send_time, now);
        for chunk in reachable.chunks(MAX_RECIPIENTS_PER_REQUEST) {
            let mut request = SendMessageRequest::new(chunk.to_vec(), content.clone(), sending_type);
            request.scheduled_at = scheduled_at;
            request.template_id = Some(template_id);
            request.coupon_id = coupon_id;
            request.workflow_id = Some(workflow.id);

            let response = self
                .messages
                .send_at(workflow.shop_id, request, now)
                .await?;
            let failed = response
                .messages
                .iter()
                .filter(|m| m.status == MessageStatus::Fail)
                .count();
            outcome.success += response.messages.len() - failed;
            outcome.failure += failed;
        }

        debug!(
            workflow_id = workflow.id,
            sending_type = %sending_type,
            success = outcome.success,
            failure = outcome.failure,
            "Message action finished"
        );
        Ok(outcome)
    }
}

enum Targets {
    Audience,
    Customer(i64),
}

pub struct WorkflowRunner {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn WorkflowExecutionStore>,
    audience: Arc<dyn AudienceSource>,
    executor: ActionExecutor,
    audience_limit: i64,
}

impl WorkflowRunner {
    pub fn new(deps: &Dependencies, executor: ActionExecutor, audience_limit: i64) -> Self {
        Self {
            workflows: deps.workflows.clone(),
            executions: deps.executions.clone(),
            audience: deps.audience.clone(),
            executor,
            audience_limit,
        }
    }

    /// Runs the workflow for its audience. Returns `None` when the workflow
    /// is inactive or deleted.
    pub async fn execute(&self, workflow: &Workflow) -> DomainResult<Option<WorkflowExecution>> {
        self.execute_at(workflow, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        workflow: &Workflow,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<WorkflowExecution>> {
        if !workflow.can_execute() {
            debug!(workflow_id = workflow.id, "Workflow not executable, skipping");
            return Ok(None);
        }
        self.run(workflow, Targets::Audience, now).await.map(Some)
    }

    /// Runs the workflow's action for a single customer.
    pub async fn execute_for_customer(
        &self,
        workflow: &Workflow,
        customer_id: i64,
    ) -> DomainResult<Option<WorkflowExecution>> {
        if !workflow.can_execute() {
            debug!(workflow_id = workflow.id, "Workflow not executable, skipping");
            return Ok(None);
        }
        self.run(workflow, Targets::Customer(customer_id), Utc::now())
            .await
            .map(Some)
    }

    async fn run(
        &self,
        workflow: &Workflow,
        targets: Targets,
        now: DateTime<Utc>,
    ) -> DomainResult<WorkflowExecution> {
        let mut execution = self
            .executions
            .insert(&WorkflowExecution::scheduled(workflow, now))
            .await?;
        let next_run = Some(workflow.next_run_after(now));

        match self.perform(workflow, &mut execution, targets, now).await {
            Ok(()) => {
                let success = execution.success_count > 0;
                self.workflows
                    .record_execution(workflow.id, success, now, next_run)
                    .await?;
                counter!("workflow_executions_total", "status" => "success").increment(1);
                info!(
                    workflow_id = workflow.id,
                    shop_id = workflow.shop_id,
                    execution_id = execution.id,
                    targets = execution.target_count,
                    success = execution.success_count,
                    failure = execution.failure_count,
                    "Workflow executed"
                );
            }
            Err(e) => {
                error!(
                    workflow_id = workflow.id,
                    shop_id = workflow.shop_id,
                    execution_id = execution.id,
                    error = %e,
                    "Workflow execution failed"
                );
                if execution.fail(e.to_string(), now).is_ok() {
                    self.executions.update(&execution).await?;
                }
                self.workflows
                    .record_execution(workflow.id, false, now, next_run)
                    .await?;
                counter!("workflow_executions_total", "status" => "failed").increment(1);
            }
        }
        Ok(execution)
    }

    async fn perform(
        &self,
        workflow: &Workflow,
        execution: &mut WorkflowExecution,
        targets: Targets,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        execution.start(now)?;
        self.executions.update(execution).await?;

        let (source, customer_ids) = match targets {
            Targets::Audience => (
                "audience",
                self.audience
                    .find_targets(workflow.shop_id, &workflow.audience, self.audience_limit)
                    .await?,
            ),
            Targets::Customer(id) => ("customer", vec![id]),
        };
        execution.details = Some(serde_json::json!({
            "targetSource": source,
            "audienceLimit": self.audience_limit,
        }));

        if customer_ids.is_empty() {
            debug!(workflow_id = workflow.id, "Empty audience");
            execution.complete(now)?;
            self.executions.update(execution).await?;
            return Ok(());
        }

        execution.set_target_count(customer_ids.len())?;
        let outcome = self.executor.execute(workflow, &customer_ids, now).await?;
        execution.update_counts(outcome.success, outcome.failure)?;
        execution.complete(now)?;
        self.executions.update(execution).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use domain::models::{
        AudienceFilter, ExecutionStatus, MessageSettings, NotificationLevel, TriggerConfig,
        WorkflowDefinition,
    };
    use domain::services::{LoggingNotificationSink, MockSmsGateway};
    use persistence::memory::{DirectoryCustomer, InMemoryDirectory, InMemoryMessageStore};
    use shared::pagination::PageRequest;

    struct Fixture {
        runner: WorkflowRunner,
        deps: Dependencies,
        store: InMemoryMessageStore,
        sink: LoggingNotificationSink,
    }

    fn nine_am() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn ten_am() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap()
    }

    async fn fixture(sink: LoggingNotificationSink) -> Fixture {
        let directory = InMemoryDirectory::new();
        directory.add_shop(1, "Glow").await;
        directory.add_template(1, 5, "Hi #{customerName}").await;
        directory.add_coupon(1, 8, true).await;
        directory.add_coupon(1, 9, false).await;
        for (id, address) in [(10, Some("010-1")), (11, Some("010-2")), (12, None)] {
            directory
                .add_customer(DirectoryCustomer {
                    id,
                    shop_id: 1,
                    name: format!("C{}", id),
                    address: address.map(str::to_string),
                    ..Default::default()
                })
                .await;
        }

        let store = InMemoryMessageStore::new();
        let deps = Dependencies::in_memory_with(
            store.clone(),
            directory,
            Arc::new(MockSmsGateway::new()),
        )
        .with_notifications(Arc::new(sink.clone()));

        let mut settings = MessageSettings::new_default(1, nine_am());
        settings.update_sender_identity("SHOP1", false, nine_am());
        deps.settings.create(&settings).await.unwrap();

        let messages = Arc::new(MessageService::new(&deps));
        let runner = WorkflowRunner::new(&deps, ActionExecutor::new(&deps, messages), 1000);
        Fixture {
            runner,
            deps,
            store,
            sink,
        }
    }

    async fn workflow(fx: &Fixture, trigger: TriggerConfig, action: ActionConfig) -> Workflow {
        let definition = WorkflowDefinition {
            title: "Test".to_string(),
            description: None,
            audience: AudienceFilter::default(),
            trigger,
            action,
        };
        fx.deps
            .workflows
            .create(&Workflow::new(1, 9, definition, nine_am()))
            .await
            .unwrap()
    }

    fn message_action(template_id: i64, send_time: NaiveTime) -> ActionConfig {
        ActionConfig::MessageOnly {
            message_template_id: template_id,
            send_time,
            delivery: Default::default(),
        }
    }

    async fn reload(fx: &Fixture, id: i64) -> Workflow {
        fx.deps.workflows.find_by_id(id).await.unwrap().unwrap()
    }

    #[test]
    fn test_delivery_schedule() {
        let (kind, at) = delivery_schedule(ten_am(), nine_am());
        assert_eq!(kind, SendingType::Reservation);
        assert_eq!(at, Some(nine_am() + Duration::hours(1)));

        let (kind, at) = delivery_schedule(NaiveTime::from_hms_opt(8, 0, 0).unwrap(), nine_am());
        assert_eq!(kind, SendingType::Immediate);
        assert!(at.is_none());
    }

    #[tokio::test]
    async fn test_message_action_reserves_for_audience() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let wf = workflow(&fx, TriggerConfig::Birthday { birthday_days_before: 3 }, message_action(5, ten_am())).await;

        let execution = fx.runner.execute_at(&wf, nine_am()).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.target_count, 3);
        assert_eq!(execution.success_count, 2);
        assert_eq!(execution.failure_count, 1);

        let messages = fx.store.all().await;
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.sending_type == SendingType::Reservation
            && m.status == MessageStatus::Pending
            && m.workflow_id == Some(wf.id)
            && m.template_id == Some(5)));
        assert_eq!(messages[0].content, "Hi C10");

        let stored = reload(&fx, wf.id).await;
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.success_count, 1);
        assert_eq!(stored.next_scheduled_at, Some(nine_am() + Duration::days(1)));
    }

    #[tokio::test]
    async fn test_churn_risk_reschedules_a_week_out() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let wf = workflow(&fx, TriggerConfig::ChurnRiskHigh, message_action(5, ten_am())).await;

        fx.runner.execute_at(&wf, nine_am()).await.unwrap();
        assert_eq!(
            reload(&fx, wf.id).await.next_scheduled_at,
            Some(nine_am() + Duration::days(7))
        );
    }

    #[tokio::test]
    async fn test_empty_audience_completes_without_success() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let mut wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, message_action(5, ten_am())).await;
        wf.audience.customer_grade_ids = vec![99];

        let execution = fx.runner.execute_at(&wf, nine_am()).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.target_count, 0);

        let stored = reload(&fx, wf.id).await;
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.failure_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_template_fails_execution() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let wf = workflow(&fx, TriggerConfig::Birthday { birthday_days_before: 1 }, message_action(404, ten_am())).await;

        let execution = fx.runner.execute_at(&wf, nine_am()).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("MessageTemplate 404")));

        let history = fx
            .deps
            .executions
            .list_for_workflow(wf.id, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert_eq!(reload(&fx, wf.id).await.failure_count, 1);
    }

    #[tokio::test]
    async fn test_inactive_workflow_is_skipped() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let mut wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, message_action(5, ten_am())).await;
        wf.deactivate(nine_am()).unwrap();

        assert!(fx.runner.execute_at(&wf, nine_am()).await.unwrap().is_none());
        assert!(fx.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_coupon_fails_all_targets() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let action = ActionConfig::CouponMessage {
            message_template_id: 5,
            send_time: ten_am(),
            coupon_id: 9,
            delivery: Default::default(),
        };
        let wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, action).await;

        let execution = fx.runner.execute_at(&wf, nine_am()).await.unwrap().unwrap();
        assert_eq!(execution.success_count, 0);
        assert_eq!(execution.failure_count, 3);
        assert!(fx.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_valid_coupon_is_attached() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let action = ActionConfig::CouponMessage {
            message_template_id: 5,
            send_time: ten_am(),
            coupon_id: 8,
            delivery: Default::default(),
        };
        let wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, action).await;

        fx.runner.execute_at(&wf, nine_am()).await.unwrap();
        assert!(fx
            .store
            .all()
            .await
            .iter()
            .all(|m| m.coupon_id == Some(8)));
    }

    #[tokio::test]
    async fn test_notification_action() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        let action = ActionConfig::SystemNotification {
            notification_title: "VIP".to_string(),
            notification_content: "Call them".to_string(),
            notification_level: NotificationLevel::Warning,
        };
        let wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, action).await;

        let execution = fx.runner.execute_at(&wf, nine_am()).await.unwrap().unwrap();
        assert_eq!((execution.success_count, execution.failure_count), (1, 0));
        assert_eq!(fx.sink.delivered().len(), 1);
        assert_eq!(fx.sink.delivered()[0].workflow_id, wf.id);
    }

    #[tokio::test]
    async fn test_failed_notification_counts_one_failure() {
        let fx = fixture(LoggingNotificationSink::failing()).await;
        let action = ActionConfig::SystemNotification {
            notification_title: "VIP".to_string(),
            notification_content: "Call them".to_string(),
            notification_level: NotificationLevel::Info,
        };
        let wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, action).await;

        let execution = fx.runner.execute_at(&wf, nine_am()).await.unwrap().unwrap();
        assert_eq!((execution.success_count, execution.failure_count), (0, 1));
        assert_eq!(reload(&fx, wf.id).await.failure_count, 1);
    }

    #[tokio::test]
    async fn test_execute_for_single_customer() {
        let fx = fixture(LoggingNotificationSink::new()).await;
        // A send time late in the day keeps the reservation in the future.
        let late = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
        let wf = workflow(&fx, TriggerConfig::VipAttentionNeeded, message_action(5, late)).await;

        let execution = fx.runner.execute_for_customer(&wf, 11).await.unwrap().unwrap();
        assert_eq!(execution.target_count, 1);

        let messages = fx.store.all().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].customer_id, 11);
    }
}
