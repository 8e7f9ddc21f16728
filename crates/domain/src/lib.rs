//! Domain layer for the shop CRM messaging backend.
//!
//! This crate contains:
//! - Domain models (Message, MessageSettings, Workflow, WorkflowExecution,
//!   AutomaticMessage) and their state machines
//! - Collaborator interfaces (gateway, directories, notifications)
//! - Storage interfaces implemented by the persistence crate
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod stores;

pub use error::{DomainError, DomainResult};
