//! Workflow execution run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::workflow::Workflow;
use super::workflow_config::{ActionType, TriggerType};

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Scheduled,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Scheduled => "SCHEDULED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(ExecutionStatus::Scheduled),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            _ => Err(format!("Invalid execution status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Execution {id} is already {status}")]
    AlreadyFinished { id: i64, status: ExecutionStatus },
}

/// One firing of a workflow.
///
/// Trigger and action types are copied from the workflow at fire time so the
/// history stays meaningful after the workflow is edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: i64,
    pub workflow_id: i64,
    pub shop_id: i64,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    pub action_type: ActionType,
    pub target_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn scheduled(workflow: &Workflow, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            workflow_id: workflow.id,
            shop_id: workflow.shop_id,
            status: ExecutionStatus::Scheduled,
            trigger_type: workflow.trigger_type(),
            action_type: workflow.action_type(),
            target_count: 0,
            success_count: 0,
            failure_count: 0,
            error_message: None,
            details: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        }
    }

    fn ensure_open(&self) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            Err(ExecutionError::AlreadyFinished {
                id: self.id,
                status: self.status,
            })
        } else {
            Ok(())
        }
    }

    fn finish(&mut self, status: ExecutionStatus, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        self.ensure_open()?;
        self.status = status;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        self.ensure_open()?;
        self.status = ExecutionStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        self.finish(ExecutionStatus::Success, now)
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        self.finish(ExecutionStatus::Failed, now)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        self.finish(ExecutionStatus::Cancelled, now)
    }

    pub fn set_target_count(&mut self, target_count: usize) -> Result<(), ExecutionError> {
        self.ensure_open()?;
        self.target_count = i32::try_from(target_count).unwrap_or(i32::MAX);
        Ok(())
    }

    /// Overwrites the running totals; may be called repeatedly while running.
    pub fn update_counts(&mut self, success: usize, failure: usize) -> Result<(), ExecutionError> {
        self.ensure_open()?;
        self.success_count = i32::try_from(success).unwrap_or(i32::MAX);
        self.failure_count = i32::try_from(failure).unwrap_or(i32::MAX);
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Percentage of processed recipients that succeeded.
    pub fn success_rate(&self) -> f64 {
        let processed = self.success_count as i64 + self.failure_count as i64;
        if processed == 0 {
            return 0.0;
        }
        self.success_count as f64 / processed as f64 * 100.0
    }

    pub fn duration_seconds(&self) -> i64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_seconds(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::{AudienceFilter, WorkflowDefinition};
    use crate::models::workflow_config::{ActionConfig, NotificationLevel, TriggerConfig};
    use chrono::Duration;

    fn execution() -> WorkflowExecution {
        let workflow = Workflow::new(
            3,
            1,
            WorkflowDefinition {
                title: "Churn watch".to_string(),
                description: None,
                audience: AudienceFilter::default(),
                trigger: TriggerConfig::ChurnRiskHigh,
                action: ActionConfig::SystemNotification {
                    notification_title: "t".to_string(),
                    notification_content: "c".to_string(),
                    notification_level: NotificationLevel::Warning,
                },
            },
            Utc::now(),
        );
        WorkflowExecution::scheduled(&workflow, Utc::now())
    }

    #[test]
    fn test_scheduled_copies_workflow_types() {
        let e = execution();
        assert_eq!(e.status, ExecutionStatus::Scheduled);
        assert_eq!(e.shop_id, 3);
        assert_eq!(e.trigger_type, TriggerType::ChurnRiskHigh);
        assert_eq!(e.action_type, ActionType::SystemNotification);
    }

    #[test]
    fn test_complete_sets_completed_at_once() {
        let mut e = execution();
        let start = Utc::now();
        e.start(start).unwrap();
        e.update_counts(2, 1).unwrap();
        e.update_counts(4, 1).unwrap();

        let end = start + Duration::seconds(42);
        e.complete(end).unwrap();
        assert_eq!(e.status, ExecutionStatus::Success);
        assert_eq!(e.completed_at, Some(end));
        assert_eq!(e.duration_seconds(), 42);

        let later = end + Duration::seconds(5);
        assert!(e.fail("late", later).is_err());
        assert!(e.cancel(later).is_err());
        assert!(e.start(later).is_err());
        assert!(e.update_counts(9, 9).is_err());
        assert_eq!(e.completed_at, Some(end));
        assert_eq!(e.status, ExecutionStatus::Success);
        assert_eq!(e.success_count, 4);
    }

    #[test]
    fn test_fail_records_error() {
        let mut e = execution();
        e.start(Utc::now()).unwrap();
        e.fail("template missing", Utc::now()).unwrap();
        assert_eq!(e.status, ExecutionStatus::Failed);
        assert_eq!(e.error_message.as_deref(), Some("template missing"));
        assert!(e.is_completed());
    }

    #[test]
    fn test_cancel_from_scheduled() {
        let mut e = execution();
        e.cancel(Utc::now()).unwrap();
        assert_eq!(e.status, ExecutionStatus::Cancelled);
        assert_eq!(e.duration_seconds(), 0);
    }

    #[test]
    fn test_duration_zero_when_unset() {
        let mut e = execution();
        assert_eq!(e.duration_seconds(), 0);
        e.start(Utc::now()).unwrap();
        assert_eq!(e.duration_seconds(), 0);
    }

    #[test]
    fn test_success_rate() {
        let mut e = execution();
        assert_eq!(e.success_rate(), 0.0);
        e.update_counts(3, 1).unwrap();
        assert!((e.success_rate() - 75.0).abs() < f64::EPSILON);
        e.update_counts(0, 5).unwrap();
        assert_eq!(e.success_rate(), 0.0);
    }

    #[test]
    fn test_status_parse() {
        for s in ["SCHEDULED", "RUNNING", "SUCCESS", "FAILED", "CANCELLED"] {
            assert_eq!(s.parse::<ExecutionStatus>().unwrap().as_str(), s);
        }
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
