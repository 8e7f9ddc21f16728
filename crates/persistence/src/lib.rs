//! Persistence layer for the shop CRM messaging pipeline.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Postgres repositories implementing the domain store traits
//! - In-memory stores for database-free runs and tests

pub mod db;
pub mod entities;
pub mod memory;
pub mod metrics;
pub mod repositories;
