//! Storage interfaces for the messaging pipeline.
//!
//! The persistence crate provides Postgres and in-memory implementations.
//! Bulk status writes only touch rows that are still `PENDING`, which keeps a
//! late dispatcher write from overwriting a cancellation.

use chrono::{DateTime, Utc};
use shared::pagination::PageRequest;
use thiserror::Error;

use crate::models::{
    AutomaticEventType, AutomaticMessage, Message, MessageSettings, NewMessage, TriggerType,
    Workflow, WorkflowExecution,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyset position `(scheduled_at, id)` of the last due reservation read.
pub type DuePosition = (DateTime<Utc>, i64);

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts all rows in one transaction; either every row persists or none.
    async fn insert_batch(&self, messages: Vec<NewMessage>) -> Result<Vec<Message>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, StoreError>;

    /// Pending reservations whose time has come, ordered by
    /// `(scheduled_at, id)` and starting strictly after `after` when given.
    async fn find_due_reservations(
        &self,
        now: DateTime<Utc>,
        after: Option<DuePosition>,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError>;

    /// PENDING → SENT for every listed id still pending. Returns rows changed.
    async fn mark_sent(&self, ids: &[i64], sent_at: DateTime<Utc>) -> Result<u64, StoreError>;

    /// PENDING → FAIL for every listed id still pending. Returns rows changed.
    async fn mark_failed(&self, ids: &[i64], failed_at: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Writes the editable fields and status of a message that is still
    /// pending. Returns false when the stored row is no longer pending.
    async fn save_pending(&self, message: &Message) -> Result<bool, StoreError>;

    async fn list_for_shop(
        &self,
        shop_id: i64,
        page: &PageRequest,
    ) -> Result<Vec<Message>, StoreError>;
}

#[async_trait::async_trait]
pub trait MessageSettingsStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the shop already has settings.
    async fn create(&self, settings: &MessageSettings) -> Result<MessageSettings, StoreError>;

    async fn find_by_shop(&self, shop_id: i64) -> Result<Option<MessageSettings>, StoreError>;

    async fn update_sender(
        &self,
        shop_id: i64,
        sender_identity: &str,
        premium_channel_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError>;

    /// Atomically adds credits.
    async fn grant(
        &self,
        shop_id: i64,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError>;

    /// Atomically removes credits if enough remain; `None` otherwise.
    async fn spend(
        &self,
        shop_id: i64,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError>;
}

#[async_trait::async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, workflow: &Workflow) -> Result<Workflow, StoreError>;

    /// Writes definition, flags and timestamps. Counters are left alone.
    async fn update(&self, workflow: &Workflow) -> Result<Workflow, StoreError>;

    /// Includes soft-deleted workflows.
    async fn find_by_id(&self, id: i64) -> Result<Option<Workflow>, StoreError>;

    /// Whether a non-deleted workflow of the shop already uses the title.
    async fn title_exists(
        &self,
        shop_id: i64,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError>;

    async fn list_for_shop(
        &self,
        shop_id: i64,
        active_only: bool,
        page: &PageRequest,
    ) -> Result<Vec<Workflow>, StoreError>;

    /// Executable workflows whose next run is due.
    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Workflow>, StoreError>;

    /// Executable workflows of the given trigger types that were never scheduled.
    async fn find_unscheduled(
        &self,
        trigger_types: &[TriggerType],
        limit: i64,
    ) -> Result<Vec<Workflow>, StoreError>;

    /// Atomic counter increment plus schedule update.
    async fn record_execution(
        &self,
        id: i64,
        success: bool,
        executed_at: DateTime<Utc>,
        next_scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait WorkflowExecutionStore: Send + Sync {
    async fn insert(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution, StoreError>;

    /// Persists progress. Rows already in a terminal state are not touched;
    /// returns false in that case.
    async fn update(&self, execution: &WorkflowExecution) -> Result<bool, StoreError>;

    async fn list_for_workflow(
        &self,
        workflow_id: i64,
        page: &PageRequest,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;
}

#[async_trait::async_trait]
pub trait AutomaticMessageStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] for a second (shop, event) row.
    async fn create(&self, message: &AutomaticMessage) -> Result<AutomaticMessage, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<AutomaticMessage>, StoreError>;

    async fn find_by_event(
        &self,
        shop_id: i64,
        event_type: AutomaticEventType,
    ) -> Result<Option<AutomaticMessage>, StoreError>;

    async fn update(&self, message: &AutomaticMessage) -> Result<AutomaticMessage, StoreError>;

    async fn list_for_shop(&self, shop_id: i64) -> Result<Vec<AutomaticMessage>, StoreError>;
}
