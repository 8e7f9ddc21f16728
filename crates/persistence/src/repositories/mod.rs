//! Repository implementations for database operations.

pub mod automatic_message;
pub mod directory;
pub mod message;
pub mod message_settings;
pub mod workflow;
pub mod workflow_execution;

pub use automatic_message::AutomaticMessageRepository;
pub use directory::DirectoryRepository;
pub use message::MessageRepository;
pub use message_settings::MessageSettingsRepository;
pub use workflow::WorkflowRepository;
pub use workflow_execution::WorkflowExecutionRepository;

use domain::stores::StoreError;

/// Maps a unique constraint violation (PostgreSQL 23505) to
/// [`StoreError::Duplicate`]; every other error passes through.
pub(crate) fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(what.to_string());
        }
    }
    StoreError::Database(err)
}
