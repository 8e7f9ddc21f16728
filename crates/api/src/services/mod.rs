//! Application services.
//!
//! Services own the messaging workflows and depend only on the store and
//! collaborator traits, so the same code runs against Postgres or the
//! in-memory stores.

pub mod automatic_message;
pub mod message_dispatch;
pub mod message_send;
pub mod message_settings;
pub mod sms_gateway;
pub mod workflow;
pub mod workflow_runner;

use std::sync::Arc;

use domain::services::{
    AudienceSource, CouponValidator, LoggingNotificationSink, MockSmsGateway, NotificationSink,
    RecipientDirectory, ShopDirectory, SmsGateway, TemplateSource, VariableResolver,
};
use domain::stores::{
    AutomaticMessageStore, MessageSettingsStore, MessageStore, WorkflowExecutionStore,
    WorkflowStore,
};
use persistence::memory::{
    InMemoryAutomaticMessageStore, InMemoryDirectory, InMemoryMessageSettingsStore,
    InMemoryMessageStore, InMemoryWorkflowExecutionStore, InMemoryWorkflowStore,
};
use persistence::repositories::{
    AutomaticMessageRepository, DirectoryRepository, MessageRepository,
    MessageSettingsRepository, WorkflowExecutionRepository, WorkflowRepository,
};
use sqlx::PgPool;

pub use automatic_message::AutomaticMessageService;
pub use message_dispatch::{DispatchReport, MessageDispatcher};
pub use message_send::MessageService;
pub use message_settings::MessageSettingsService;
pub use sms_gateway::{build_gateway, HttpSmsGateway};
pub use workflow::WorkflowService;
pub use workflow_runner::{ActionExecutor, ActionOutcome, WorkflowRunner};

use crate::config::Config;

/// Stores and collaborators the services are built from.
#[derive(Clone)]
pub struct Dependencies {
    pub messages: Arc<dyn MessageStore>,
    pub settings: Arc<dyn MessageSettingsStore>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub executions: Arc<dyn WorkflowExecutionStore>,
    pub automatic_messages: Arc<dyn AutomaticMessageStore>,
    pub recipients: Arc<dyn RecipientDirectory>,
    pub shops: Arc<dyn ShopDirectory>,
    pub variables: Arc<dyn VariableResolver>,
    pub templates: Arc<dyn TemplateSource>,
    pub coupons: Arc<dyn CouponValidator>,
    pub audience: Arc<dyn AudienceSource>,
    pub gateway: Arc<dyn SmsGateway>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Dependencies {
    /// Postgres repositories for every store and reference lookup.
    pub fn postgres(pool: PgPool, gateway: Arc<dyn SmsGateway>) -> Self {
        let directory = Arc::new(DirectoryRepository::new(pool.clone()));
        Self {
            messages: Arc::new(MessageRepository::new(pool.clone())),
            settings: Arc::new(MessageSettingsRepository::new(pool.clone())),
            workflows: Arc::new(WorkflowRepository::new(pool.clone())),
            executions: Arc::new(WorkflowExecutionRepository::new(pool.clone())),
            automatic_messages: Arc::new(AutomaticMessageRepository::new(pool)),
            recipients: directory.clone(),
            shops: directory.clone(),
            variables: directory.clone(),
            templates: directory.clone(),
            coupons: directory.clone(),
            audience: directory,
            gateway,
            notifications: Arc::new(LoggingNotificationSink::new()),
        }
    }

    /// In-memory stores sharing one directory; used without a database.
    pub fn in_memory(directory: InMemoryDirectory, gateway: Arc<dyn SmsGateway>) -> Self {
        let messages = InMemoryMessageStore::new();
        Self::in_memory_with(messages, directory, gateway)
    }

    /// Like [`Dependencies::in_memory`] but over a caller-held message store.
    pub fn in_memory_with(
        messages: InMemoryMessageStore,
        directory: InMemoryDirectory,
        gateway: Arc<dyn SmsGateway>,
    ) -> Self {
        let directory = Arc::new(directory.with_message_log(messages.clone()));
        Self {
            messages: Arc::new(messages),
            settings: Arc::new(InMemoryMessageSettingsStore::new()),
            workflows: Arc::new(InMemoryWorkflowStore::new()),
            executions: Arc::new(InMemoryWorkflowExecutionStore::new()),
            automatic_messages: Arc::new(InMemoryAutomaticMessageStore::new()),
            recipients: directory.clone(),
            shops: directory.clone(),
            variables: directory.clone(),
            templates: directory.clone(),
            coupons: directory.clone(),
            audience: directory,
            gateway,
            notifications: Arc::new(LoggingNotificationSink::new()),
        }
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_mock_gateway(mut self, gateway: MockSmsGateway) -> Self {
        self.gateway = Arc::new(gateway);
        self
    }
}

/// Every service, wired over one set of dependencies.
#[derive(Clone)]
pub struct Services {
    pub messages: Arc<MessageService>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub settings: Arc<MessageSettingsService>,
    pub automatic_messages: Arc<AutomaticMessageService>,
    pub workflows: Arc<WorkflowService>,
    pub runner: Arc<WorkflowRunner>,
}

impl Services {
    pub fn new(deps: &Dependencies, config: &Config) -> Self {
        let messages = Arc::new(MessageService::new(deps));
        let executor = ActionExecutor::new(deps, messages.clone());
        let runner = Arc::new(WorkflowRunner::new(
            deps,
            executor,
            config.workflows.audience_limit,
        ));

        Self {
            dispatcher: Arc::new(MessageDispatcher::new(deps, config.dispatch.batch_size)),
            settings: Arc::new(MessageSettingsService::new(deps)),
            automatic_messages: Arc::new(AutomaticMessageService::new(deps, messages.clone())),
            workflows: Arc::new(WorkflowService::new(deps, runner.clone())),
            runner,
            messages,
        }
    }
}
