//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod automatic_message;
pub mod message;
pub mod message_settings;
pub mod workflow;
pub mod workflow_execution;

pub use automatic_message::AutomaticMessageEntity;
pub use message::MessageEntity;
pub use message_settings::MessageSettingsEntity;
pub use workflow::{WorkflowEntity, WorkflowJson};
pub use workflow_execution::WorkflowExecutionEntity;
