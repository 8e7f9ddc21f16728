//! In-memory stores for development runs without a database and for tests.
//!
//! Each store keeps its rows behind an `Arc<RwLock<..>>`, so clones share
//! state. Semantics mirror the Postgres repositories: bulk status writes only
//! touch pending rows and uniqueness violations surface as
//! [`StoreError::Duplicate`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use domain::models::{
    AudienceFilter, AutomaticEventType, AutomaticMessage, Message, MessageSettings,
    MessageStatus, NewMessage, TriggerType, Workflow, WorkflowExecution,
};
use domain::services::{
    AudienceSource, CouponValidator, RecipientDirectory, ShopDirectory, TemplateSource,
    VariableResolver,
};
use domain::stores::{
    AutomaticMessageStore, DuePosition, MessageSettingsStore, MessageStore, StoreError,
    WorkflowExecutionStore, WorkflowStore,
};
use shared::pagination::PageRequest;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct IdSequence(AtomicI64);

impl IdSequence {
    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Newest first, starting after the cursor, `fetch_limit` rows.
fn page_of<T: Clone>(
    mut rows: Vec<T>,
    page: &PageRequest,
    key: impl Fn(&T) -> (DateTime<Utc>, i64),
) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows.into_iter()
        .filter(|row| match page.cursor {
            Some(c) => key(row) < (c.created_at, c.id),
            None => true,
        })
        .take(page.fetch_limit().max(0) as usize)
        .collect()
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageStore {
    rows: Arc<RwLock<HashMap<i64, Message>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored message ordered by id.
    pub async fn all(&self) -> Vec<Message> {
        let mut rows: Vec<Message> = self.rows.read().await.values().cloned().collect();
        rows.sort_by_key(|m| m.id);
        rows
    }

    /// Customers that received a sent message at or after `since`.
    pub async fn recent_receivers(&self, since: DateTime<Utc>) -> HashSet<i64> {
        self.rows
            .read()
            .await
            .values()
            .filter(|m| m.status == MessageStatus::Sent && m.sent_at.is_some_and(|at| at >= since))
            .map(|m| m.customer_id)
            .collect()
    }

    async fn mark(&self, ids: &[i64], status: MessageStatus, at: DateTime<Utc>) -> u64 {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(message) = rows.get_mut(id) {
                let result = match status {
                    MessageStatus::Sent => message.mark_as_sent(at),
                    _ => message.mark_as_failed(at),
                };
                if result.is_ok() {
                    changed += 1;
                }
            }
        }
        changed
    }
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_batch(&self, messages: Vec<NewMessage>) -> Result<Vec<Message>, StoreError> {
        let mut rows = self.rows.write().await;
        let inserted: Vec<Message> = messages
            .into_iter()
            .map(|m| m.into_message(self.ids.next()))
            .collect();
        for message in &inserted {
            rows.insert(message.id, message.clone());
        }
        Ok(inserted)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_due_reservations(
        &self,
        now: DateTime<Utc>,
        after: Option<DuePosition>,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let mut due: Vec<Message> = self
            .rows
            .read()
            .await
            .values()
            .filter(|m| {
                m.status == MessageStatus::Pending
                    && m.sending_type.is_reservation()
                    && m.scheduled_at <= now
                    && after.map_or(true, |position| (m.scheduled_at, m.id) > position)
            })
            .cloned()
            .collect();
        due.sort_by_key(|m| (m.scheduled_at, m.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_sent(&self, ids: &[i64], sent_at: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.mark(ids, MessageStatus::Sent, sent_at).await)
    }

    async fn mark_failed(&self, ids: &[i64], failed_at: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.mark(ids, MessageStatus::Fail, failed_at).await)
    }

    async fn save_pending(&self, message: &Message) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&message.id) {
            Some(stored) if stored.status == MessageStatus::Pending => {
                *stored = message.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_shop(
        &self,
        shop_id: i64,
        page: &PageRequest,
    ) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<Message> = self
            .rows
            .read()
            .await
            .values()
            .filter(|m| m.shop_id == shop_id)
            .cloned()
            .collect();
        Ok(page_of(rows, page, |m| (m.created_at, m.id)))
    }
}

// ============================================================================
// Message settings
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageSettingsStore {
    rows: Arc<RwLock<HashMap<i64, MessageSettings>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryMessageSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MessageSettingsStore for InMemoryMessageSettingsStore {
    async fn create(&self, settings: &MessageSettings) -> Result<MessageSettings, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&settings.shop_id) {
            return Err(StoreError::Duplicate("message settings for shop".to_string()));
        }
        let mut created = settings.clone();
        created.id = self.ids.next();
        rows.insert(created.shop_id, created.clone());
        Ok(created)
    }

    async fn find_by_shop(&self, shop_id: i64) -> Result<Option<MessageSettings>, StoreError> {
        Ok(self.rows.read().await.get(&shop_id).cloned())
    }

    async fn update_sender(
        &self,
        shop_id: i64,
        sender_identity: &str,
        premium_channel_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&shop_id).map(|settings| {
            settings.update_sender_identity(sender_identity.to_string(), premium_channel_enabled, now);
            settings.clone()
        }))
    }

    async fn grant(
        &self,
        shop_id: i64,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&shop_id).map(|settings| {
            settings.balance += amount;
            settings.updated_at = now;
            settings.clone()
        }))
    }

    async fn spend(
        &self,
        shop_id: i64,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&shop_id) {
            Some(settings) if settings.balance >= amount => {
                settings.balance -= amount;
                settings.updated_at = now;
                Ok(Some(settings.clone()))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Workflows
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowStore {
    rows: Arc<RwLock<HashMap<i64, Workflow>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn title_taken(rows: &HashMap<i64, Workflow>, workflow: &Workflow) -> bool {
    rows.values().any(|w| {
        w.id != workflow.id
            && w.shop_id == workflow.shop_id
            && w.title == workflow.title
            && !w.is_deleted()
    })
}

#[async_trait::async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, workflow: &Workflow) -> Result<Workflow, StoreError> {
        let mut rows = self.rows.write().await;
        let mut created = workflow.clone();
        created.id = self.ids.next();
        if title_taken(&rows, &created) {
            return Err(StoreError::Duplicate("workflow title".to_string()));
        }
        rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, workflow: &Workflow) -> Result<Workflow, StoreError> {
        let mut rows = self.rows.write().await;
        if !workflow.is_deleted() && title_taken(&rows, workflow) {
            return Err(StoreError::Duplicate("workflow title".to_string()));
        }
        let stored = rows
            .get_mut(&workflow.id)
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;

        let counters = (
            stored.execution_count,
            stored.success_count,
            stored.failure_count,
            stored.last_executed_at,
        );
        *stored = workflow.clone();
        (
            stored.execution_count,
            stored.success_count,
            stored.failure_count,
            stored.last_executed_at,
        ) = counters;
        Ok(stored.clone())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Workflow>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn title_exists(
        &self,
        shop_id: i64,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        Ok(self.rows.read().await.values().any(|w| {
            w.shop_id == shop_id
                && w.title == title
                && !w.is_deleted()
                && Some(w.id) != exclude_id
        }))
    }

    async fn list_for_shop(
        &self,
        shop_id: i64,
        active_only: bool,
        page: &PageRequest,
    ) -> Result<Vec<Workflow>, StoreError> {
        let rows: Vec<Workflow> = self
            .rows
            .read()
            .await
            .values()
            .filter(|w| w.shop_id == shop_id && !w.is_deleted() && (!active_only || w.is_active))
            .cloned()
            .collect();
        Ok(page_of(rows, page, |w| (w.created_at, w.id)))
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Workflow>, StoreError> {
        let mut due: Vec<Workflow> = self
            .rows
            .read()
            .await
            .values()
            .filter(|w| w.is_scheduled_to_run(now))
            .cloned()
            .collect();
        due.sort_by_key(|w| (w.next_scheduled_at, w.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn find_unscheduled(
        &self,
        trigger_types: &[TriggerType],
        limit: i64,
    ) -> Result<Vec<Workflow>, StoreError> {
        let mut rows: Vec<Workflow> = self
            .rows
            .read()
            .await
            .values()
            .filter(|w| {
                w.can_execute()
                    && w.next_scheduled_at.is_none()
                    && trigger_types.contains(&w.trigger_type())
            })
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.id);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn record_execution(
        &self,
        id: i64,
        success: bool,
        executed_at: DateTime<Utc>,
        next_scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if let Some(workflow) = rows.get_mut(&id) {
            workflow.record_execution(success, executed_at);
            workflow.next_scheduled_at = next_scheduled_at;
        }
        Ok(())
    }
}

// ============================================================================
// Workflow executions
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowExecutionStore {
    rows: Arc<RwLock<HashMap<i64, WorkflowExecution>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryWorkflowExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WorkflowExecutionStore for InMemoryWorkflowExecutionStore {
    async fn insert(&self, execution: &WorkflowExecution) -> Result<WorkflowExecution, StoreError> {
        let mut created = execution.clone();
        created.id = self.ids.next();
        self.rows.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&execution.id) {
            Some(stored) if !stored.status.is_terminal() => {
                *stored = execution.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_workflow(
        &self,
        workflow_id: i64,
        page: &PageRequest,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let rows: Vec<WorkflowExecution> = self
            .rows
            .read()
            .await
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        Ok(page_of(rows, page, |e| (e.created_at, e.id)))
    }
}

// ============================================================================
// Automatic messages
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryAutomaticMessageStore {
    rows: Arc<RwLock<HashMap<i64, AutomaticMessage>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryAutomaticMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AutomaticMessageStore for InMemoryAutomaticMessageStore {
    async fn create(&self, message: &AutomaticMessage) -> Result<AutomaticMessage, StoreError> {
        let mut rows = self.rows.write().await;
        let duplicate = rows
            .values()
            .any(|m| m.shop_id == message.shop_id && m.event_type == message.event_type);
        if duplicate {
            return Err(StoreError::Duplicate("automatic message for event".to_string()));
        }
        let mut created = message.clone();
        created.id = self.ids.next();
        rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AutomaticMessage>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_event(
        &self,
        shop_id: i64,
        event_type: AutomaticEventType,
    ) -> Result<Option<AutomaticMessage>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|m| m.shop_id == shop_id && m.event_type == event_type)
            .cloned())
    }

    async fn update(&self, message: &AutomaticMessage) -> Result<AutomaticMessage, StoreError> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&message.id)
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;
        *stored = message.clone();
        Ok(stored.clone())
    }

    async fn list_for_shop(&self, shop_id: i64) -> Result<Vec<AutomaticMessage>, StoreError> {
        let mut rows: Vec<AutomaticMessage> = self
            .rows
            .read()
            .await
            .values()
            .filter(|m| m.shop_id == shop_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.event_type.as_str());
        Ok(rows)
    }
}

// ============================================================================
// Directory
// ============================================================================

/// A customer known to [`InMemoryDirectory`].
#[derive(Debug, Clone, Default)]
pub struct DirectoryCustomer {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub grade_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub last_visit_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct DirectoryData {
    shops: HashMap<i64, String>,
    customers: HashMap<i64, DirectoryCustomer>,
    templates: HashMap<(i64, i64), String>,
    coupons: HashMap<(i64, i64), bool>,
}

/// Reference data for runs without a database.
///
/// When built with [`InMemoryDirectory::with_message_log`], recent message
/// receivers are read from that store for audience filtering.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    data: Arc<RwLock<DirectoryData>>,
    messages: Option<InMemoryMessageStore>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_log(mut self, messages: InMemoryMessageStore) -> Self {
        self.messages = Some(messages);
        self
    }

    pub async fn add_shop(&self, shop_id: i64, name: impl Into<String>) {
        self.data.write().await.shops.insert(shop_id, name.into());
    }

    pub async fn add_customer(&self, customer: DirectoryCustomer) {
        self.data
            .write()
            .await
            .customers
            .insert(customer.id, customer);
    }

    pub async fn add_template(&self, shop_id: i64, template_id: i64, content: impl Into<String>) {
        self.data
            .write()
            .await
            .templates
            .insert((shop_id, template_id), content.into());
    }

    pub async fn add_coupon(&self, shop_id: i64, coupon_id: i64, valid: bool) {
        self.data
            .write()
            .await
            .coupons
            .insert((shop_id, coupon_id), valid);
    }
}

#[async_trait::async_trait]
impl RecipientDirectory for InMemoryDirectory {
    async fn resolve_addresses(
        &self,
        customer_ids: &[i64],
    ) -> Result<HashMap<i64, String>, StoreError> {
        let data = self.data.read().await;
        Ok(customer_ids
            .iter()
            .filter_map(|id| {
                data.customers
                    .get(id)
                    .and_then(|c| c.address.clone())
                    .filter(|a| !a.is_empty())
                    .map(|a| (*id, a))
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ShopDirectory for InMemoryDirectory {
    async fn exists(&self, shop_id: i64) -> Result<bool, StoreError> {
        Ok(self.data.read().await.shops.contains_key(&shop_id))
    }
}

#[async_trait::async_trait]
impl VariableResolver for InMemoryDirectory {
    async fn payload(
        &self,
        shop_id: i64,
        customer_id: i64,
    ) -> Result<HashMap<String, String>, StoreError> {
        let data = self.data.read().await;
        let mut payload = HashMap::new();
        if let Some(customer) = data.customers.get(&customer_id).filter(|c| c.shop_id == shop_id) {
            payload.insert("customerName".to_string(), customer.name.clone());
        }
        if let Some(shop_name) = data.shops.get(&shop_id) {
            payload.insert("shopName".to_string(), shop_name.clone());
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl TemplateSource for InMemoryDirectory {
    async fn template_content(
        &self,
        shop_id: i64,
        template_id: i64,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .templates
            .get(&(shop_id, template_id))
            .cloned())
    }
}

#[async_trait::async_trait]
impl CouponValidator for InMemoryDirectory {
    async fn is_valid(&self, shop_id: i64, coupon_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .coupons
            .get(&(shop_id, coupon_id))
            .copied()
            .unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl AudienceSource for InMemoryDirectory {
    async fn find_targets(
        &self,
        shop_id: i64,
        filter: &AudienceFilter,
        limit: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let now = Utc::now();
        let dormant_cutoff = now
            .checked_sub_months(Months::new(filter.dormant_period_months.max(0) as u32))
            .unwrap_or(now);
        let recent_receivers = match (&self.messages, filter.exclude_recent_message_receivers) {
            (Some(messages), true) => {
                let since = now - Duration::days(i64::from(filter.recent_message_period_days));
                messages.recent_receivers(since).await
            }
            _ => HashSet::new(),
        };

        let data = self.data.read().await;
        let mut targets: Vec<i64> = data
            .customers
            .values()
            .filter(|c| c.shop_id == shop_id)
            .filter(|c| {
                filter.customer_grade_ids.is_empty()
                    || c.grade_id.is_some_and(|g| filter.customer_grade_ids.contains(&g))
            })
            .filter(|c| {
                filter.tag_ids.is_empty() || c.tag_ids.iter().any(|t| filter.tag_ids.contains(t))
            })
            .filter(|c| {
                !filter.exclude_dormant || c.last_visit_at.is_some_and(|at| at >= dormant_cutoff)
            })
            .filter(|c| !recent_receivers.contains(&c.id))
            .map(|c| c.id)
            .collect();
        targets.sort_unstable();
        targets.truncate(limit.max(0) as usize);
        Ok(targets)
    }
}
