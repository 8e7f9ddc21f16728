//! Workflow entity (database row mapping).
//!
//! Trigger and action configuration are stored as JSONB holding the tagged
//! form of the typed configuration. The `trigger_type`/`action_type` columns
//! duplicate the tag so that schedulers can filter without touching JSON.

use chrono::{DateTime, Utc};
use domain::models::{ActionConfig, AudienceFilter, TriggerConfig, Workflow};
use domain::stores::StoreError;
use sqlx::FromRow;

/// Database row mapping for the workflows table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowEntity {
    pub id: i64,
    pub shop_id: i64,
    pub staff_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub audience: serde_json::Value,
    pub trigger_type: String,
    pub trigger_category: String,
    pub trigger_config: serde_json::Value,
    pub action_type: String,
    pub action_config: serde_json::Value,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WorkflowEntity {
    pub fn into_domain(self) -> Result<Workflow, StoreError> {
        let audience: AudienceFilter = serde_json::from_value(self.audience)?;
        let trigger: TriggerConfig = serde_json::from_value(self.trigger_config)?;
        let action: ActionConfig = serde_json::from_value(self.action_config)?;

        if trigger.trigger_type().as_str() != self.trigger_type {
            return Err(StoreError::Corrupt(format!(
                "workflow {} trigger_type {} does not match its configuration",
                self.id, self.trigger_type
            )));
        }
        if action.action_type().as_str() != self.action_type {
            return Err(StoreError::Corrupt(format!(
                "workflow {} action_type {} does not match its configuration",
                self.id, self.action_type
            )));
        }

        Ok(Workflow {
            id: self.id,
            shop_id: self.shop_id,
            staff_id: self.staff_id,
            title: self.title,
            description: self.description,
            is_active: self.is_active,
            audience,
            trigger,
            action,
            execution_count: self.execution_count,
            success_count: self.success_count,
            failure_count: self.failure_count,
            last_executed_at: self.last_executed_at,
            next_scheduled_at: self.next_scheduled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

/// JSON columns of a workflow, ready to bind.
#[derive(Debug, Clone)]
pub struct WorkflowJson {
    pub audience: serde_json::Value,
    pub trigger_config: serde_json::Value,
    pub action_config: serde_json::Value,
}

impl WorkflowJson {
    pub fn from_domain(workflow: &Workflow) -> Result<Self, StoreError> {
        Ok(Self {
            audience: serde_json::to_value(&workflow.audience)?,
            trigger_config: serde_json::to_value(&workflow.trigger)?,
            action_config: serde_json::to_value(&workflow.action)?,
        })
    }
}
