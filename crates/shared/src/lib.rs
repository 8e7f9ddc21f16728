//! Shared utilities and common types for the shop CRM backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Keyset pagination cursors
//! - Common validation logic

pub mod pagination;
pub mod validation;
