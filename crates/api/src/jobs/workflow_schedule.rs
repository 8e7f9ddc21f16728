//! Time-based workflow scheduling.
//!
//! Each pass runs the workflows whose `next_scheduled_at` has come, then
//! picks up time-based workflows that have never been scheduled. A run
//! always sets the next schedule, so a workflow is handled once per pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::models::{TriggerType, Workflow};
use domain::stores::WorkflowStore;
use domain::DomainResult;
use serde::Serialize;
use tracing::{error, info};

use super::scheduler::Job;
use crate::services::WorkflowRunner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePassReport {
    pub due: usize,
    pub first_runs: usize,
    pub executed: usize,
    pub errors: usize,
}

pub struct WorkflowScheduleJob {
    workflows: Arc<dyn WorkflowStore>,
    runner: Arc<WorkflowRunner>,
    delay: Duration,
    batch_size: i64,
}

impl WorkflowScheduleJob {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runner: Arc<WorkflowRunner>,
        interval_secs: u64,
        batch_size: i64,
    ) -> Self {
        Self {
            workflows,
            runner,
            delay: Duration::from_secs(interval_secs),
            batch_size,
        }
    }

    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> DomainResult<SchedulePassReport> {
        let mut report = SchedulePassReport::default();

        let due = self.workflows.find_due(now, self.batch_size).await?;
        report.due = due.len();
        self.run_all(&due, now, &mut report).await;

        let unscheduled = self
            .workflows
            .find_unscheduled(&TriggerType::TIME_BASED, self.batch_size)
            .await?;
        report.first_runs = unscheduled.len();
        self.run_all(&unscheduled, now, &mut report).await;

        if report.due + report.first_runs > 0 {
            info!(
                due = report.due,
                first_runs = report.first_runs,
                executed = report.executed,
                errors = report.errors,
                "Workflow schedule pass completed"
            );
        }
        Ok(report)
    }

    async fn run_all(&self, workflows: &[Workflow], now: DateTime<Utc>, report: &mut SchedulePassReport) {
        for workflow in workflows {
            match self.runner.execute_at(workflow, now).await {
                Ok(Some(_)) => report.executed += 1,
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(
                        workflow_id = workflow.id,
                        shop_id = workflow.shop_id,
                        error = %e,
                        "Scheduled workflow run failed"
                    );
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Job for WorkflowScheduleJob {
    fn name(&self) -> &'static str {
        "workflow_schedule"
    }

    fn delay(&self) -> Duration {
        self.delay
    }

    async fn execute(&self) -> Result<(), String> {
        self.run_pass_at(Utc::now())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
