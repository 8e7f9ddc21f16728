//! Errors surfaced by the messaging services.

use thiserror::Error;

use crate::models::{ConfigurationError, ExecutionError, MessageError, SettingsError, WorkflowError};
use crate::services::GatewayError;
use crate::stores::StoreError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = DomainError::not_found("Workflow", 42);
        assert_eq!(err.to_string(), "Workflow 42 not found");
    }

    #[test]
    fn test_configuration_error_is_transparent() {
        let err: DomainError = ConfigurationError::MissingField {
            kind: "visit-cycle",
            field: "visitCycleDays",
        }
        .into();
        assert_eq!(err.to_string(), "visitCycleDays is required for visit-cycle");
    }
}
