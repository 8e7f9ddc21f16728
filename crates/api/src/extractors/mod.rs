//! Custom Axum extractors.

pub mod staff;

pub use staff::{StaffId, STAFF_ID_HEADER};
