//! HTTP route handlers.

pub mod automatic_messages;
pub mod health;
pub mod message_settings;
pub mod messages;
pub mod workflows;

use serde::Deserialize;
use shared::pagination::{CursorError, PageRequest};

/// `?cursor=&limit=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn page_request(&self) -> Result<PageRequest, CursorError> {
        PageRequest::from_query(self.cursor.as_deref(), self.limit)
    }
}
