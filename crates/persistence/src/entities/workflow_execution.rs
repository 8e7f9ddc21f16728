//! Workflow execution entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ActionType, ExecutionStatus, TriggerType, WorkflowExecution};
use domain::stores::StoreError;
use sqlx::FromRow;

/// Database row mapping for the workflow_executions table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowExecutionEntity {
    pub id: i64,
    pub workflow_id: i64,
    pub shop_id: i64,
    pub status: String,
    pub trigger_type: String,
    pub action_type: String,
    pub target_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub error_message: Option<String>,
    pub execution_details: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecutionEntity {
    pub fn into_domain(self) -> Result<WorkflowExecution, StoreError> {
        Ok(WorkflowExecution {
            id: self.id,
            workflow_id: self.workflow_id,
            shop_id: self.shop_id,
            status: self
                .status
                .parse::<ExecutionStatus>()
                .map_err(StoreError::Corrupt)?,
            trigger_type: self
                .trigger_type
                .parse::<TriggerType>()
                .map_err(StoreError::Corrupt)?,
            action_type: self
                .action_type
                .parse::<ActionType>()
                .map_err(StoreError::Corrupt)?,
            target_count: self.target_count,
            success_count: self.success_count,
            failure_count: self.failure_count,
            error_message: self.error_message,
            details: self.execution_details,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_domain() {
        let now = Utc::now();
        let entity = WorkflowExecutionEntity {
            id: 1,
            workflow_id: 2,
            shop_id: 3,
            status: "FAILED".to_string(),
            trigger_type: "churn-risk-high".to_string(),
            action_type: "coupon-message".to_string(),
            target_count: 10,
            success_count: 0,
            failure_count: 10,
            error_message: Some("coupon expired".to_string()),
            execution_details: None,
            started_at: Some(now),
            completed_at: Some(now),
            created_at: now,
        };
        let execution = entity.into_domain().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.trigger_type, TriggerType::ChurnRiskHigh);
        assert_eq!(execution.action_type, ActionType::CouponMessage);
    }
}
