//! Workflow domain model.
//!
//! A workflow is a marketing-automation rule owned by a shop: who it targets,
//! what makes it fire and what it does when it fires. It also carries running
//! execution statistics and the cursor of its next scheduled run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::workflow_config::{
    ActionConfig, ActionConfigInput, ActionType, ConfigurationError, TriggerCategory,
    TriggerConfig, TriggerConfigInput, TriggerType,
};

pub const DEFAULT_DORMANT_PERIOD_MONTHS: i32 = 6;
pub const DEFAULT_RECENT_MESSAGE_PERIOD_DAYS: i32 = 30;

/// State conflicts on a workflow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow {0} has been deleted")]
    Deleted(i64),
}

// ============================================================================
// Audience filter
// ============================================================================

fn default_dormant_period_months() -> i32 {
    DEFAULT_DORMANT_PERIOD_MONTHS
}

fn default_recent_message_period_days() -> i32 {
    DEFAULT_RECENT_MESSAGE_PERIOD_DAYS
}

/// Which customers of the shop a workflow addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AudienceFilter {
    /// Empty means every grade.
    #[serde(default)]
    pub customer_grade_ids: Vec<i64>,

    /// Empty means no tag restriction.
    #[serde(default)]
    pub tag_ids: Vec<i64>,

    #[serde(default)]
    pub exclude_dormant: bool,

    #[serde(default = "default_dormant_period_months")]
    #[validate(range(min = 1, max = 120, message = "dormantPeriodMonths must be 1-120"))]
    pub dormant_period_months: i32,

    #[serde(default)]
    pub exclude_recent_message_receivers: bool,

    #[serde(default = "default_recent_message_period_days")]
    #[validate(range(min = 1, max = 365, message = "recentMessagePeriodDays must be 1-365"))]
    pub recent_message_period_days: i32,
}

impl Default for AudienceFilter {
    fn default() -> Self {
        Self {
            customer_grade_ids: Vec::new(),
            tag_ids: Vec::new(),
            exclude_dormant: false,
            dormant_period_months: DEFAULT_DORMANT_PERIOD_MONTHS,
            exclude_recent_message_receivers: false,
            recent_message_period_days: DEFAULT_RECENT_MESSAGE_PERIOD_DAYS,
        }
    }
}

// ============================================================================
// Core Model
// ============================================================================

/// A persisted workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: i64,
    pub shop_id: i64,
    pub staff_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub audience: AudienceFilter,
    pub trigger: TriggerConfig,
    pub action: ActionConfig,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// A new, active workflow that has never run.
    pub fn new(
        shop_id: i64,
        staff_id: i64,
        definition: WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            shop_id,
            staff_id,
            title: definition.title,
            description: definition.description,
            is_active: true,
            audience: definition.audience,
            trigger: definition.trigger,
            action: definition.action,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            last_executed_at: None,
            next_scheduled_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.trigger.trigger_type()
    }

    pub fn trigger_category(&self) -> TriggerCategory {
        self.trigger.category()
    }

    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Only active, non-deleted workflows may fire.
    pub fn can_execute(&self) -> bool {
        self.is_active && !self.is_deleted()
    }

    pub fn belongs_to_shop(&self, shop_id: i64) -> bool {
        self.shop_id == shop_id
    }

    pub fn is_owned_by(&self, staff_id: i64) -> bool {
        self.staff_id == staff_id
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_not_deleted()?;
        self.is_active = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_not_deleted()?;
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    /// Marks the workflow deleted and forces it inactive.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_not_deleted()?;
        self.deleted_at = Some(now);
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the definition, keeping statistics and schedule.
    pub fn redefine(
        &mut self,
        definition: WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.ensure_not_deleted()?;
        self.title = definition.title;
        self.description = definition.description;
        self.audience = definition.audience;
        self.trigger = definition.trigger;
        self.action = definition.action;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), WorkflowError> {
        if self.is_deleted() {
            Err(WorkflowError::Deleted(self.id))
        } else {
            Ok(())
        }
    }

    /// In-memory counterpart of the storage-level counter increment.
    pub fn record_execution(&mut self, success: bool, now: DateTime<Utc>) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_executed_at = Some(now);
    }

    /// Percentage of executions that succeeded; 0 before the first run.
    pub fn success_rate(&self) -> f64 {
        if self.execution_count <= 0 {
            return 0.0;
        }
        self.success_count as f64 / self.execution_count as f64 * 100.0
    }

    /// When the next scheduled run after `from` should happen.
    pub fn next_run_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + self.trigger_type().rerun_interval()
    }

    pub fn update_schedule(&mut self, next: DateTime<Utc>) {
        self.next_scheduled_at = Some(next);
    }

    pub fn is_scheduled_to_run(&self, now: DateTime<Utc>) -> bool {
        self.can_execute() && self.next_scheduled_at.is_some_and(|at| at <= now)
    }
}

/// The validated, user-editable part of a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub title: String,
    pub description: Option<String>,
    pub audience: AudienceFilter,
    pub trigger: TriggerConfig,
    pub action: ActionConfig,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Request payload for creating or replacing a workflow.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub title: String,

    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub audience: AudienceFilter,

    pub trigger_type: TriggerType,

    #[serde(default)]
    pub trigger_config: TriggerConfigInput,

    pub action_type: ActionType,

    #[serde(default)]
    pub action_config: ActionConfigInput,

    /// Only honoured on create; updates use activate/deactivate.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl WorkflowRequest {
    /// Converts the wire configuration into the typed definition.
    pub fn into_definition(self) -> Result<WorkflowDefinition, ConfigurationError> {
        let trigger = TriggerConfig::build(self.trigger_type, &self.trigger_config)?;
        let action = ActionConfig::build(self.action_type, &self.action_config)?;
        Ok(WorkflowDefinition {
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            audience: self.audience,
            trigger,
            action,
        })
    }
}

/// Query parameters for listing workflows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWorkflowsQuery {
    #[serde(default)]
    pub active_only: bool,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Workflow as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResponse {
    pub id: i64,
    pub shop_id: i64,
    pub staff_id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub audience: AudienceFilter,
    pub trigger_type: TriggerType,
    pub trigger_category: TriggerCategory,
    pub trigger: TriggerConfig,
    pub action_type: ActionType,
    pub action: ActionConfig,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Workflow> for WorkflowResponse {
    fn from(workflow: Workflow) -> Self {
        Self {
            trigger_type: workflow.trigger_type(),
            trigger_category: workflow.trigger_category(),
            action_type: workflow.action_type(),
            success_rate: workflow.success_rate(),
            id: workflow.id,
            shop_id: workflow.shop_id,
            staff_id: workflow.staff_id,
            title: workflow.title,
            description: workflow.description,
            is_active: workflow.is_active,
            audience: workflow.audience,
            trigger: workflow.trigger,
            action: workflow.action,
            execution_count: workflow.execution_count,
            success_count: workflow.success_count,
            failure_count: workflow.failure_count,
            last_executed_at: workflow.last_executed_at,
            next_scheduled_at: workflow.next_scheduled_at,
            created_at: workflow.created_at,
            updated_at: workflow.updated_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
