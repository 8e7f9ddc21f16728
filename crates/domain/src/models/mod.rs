//! Domain models for the shop CRM messaging pipeline.

pub mod automatic_message;
pub mod message;
pub mod message_settings;
pub mod workflow;
pub mod workflow_config;
pub mod workflow_execution;

pub use automatic_message::{AutomaticEventType, AutomaticMessage};
pub use message::{Message, MessageError, MessageKind, MessageStatus, NewMessage, SendingType};
pub use message_settings::{MessageSettings, SettingsError};
pub use workflow::{AudienceFilter, Workflow, WorkflowDefinition, WorkflowError};
pub use workflow_config::{
    ActionConfig, ActionType, ConfigurationError, NotificationLevel, TriggerCategory,
    TriggerConfig, TriggerType,
};
pub use workflow_execution::{ExecutionError, ExecutionStatus, WorkflowExecution};
