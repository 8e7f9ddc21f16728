//! Automatic message entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{AutomaticEventType, AutomaticMessage};
use domain::stores::StoreError;
use sqlx::FromRow;

/// Database row mapping for the automatic_messages table.
#[derive(Debug, Clone, FromRow)]
pub struct AutomaticMessageEntity {
    pub id: i64,
    pub shop_id: i64,
    pub event_type: String,
    pub template_name: String,
    pub content: String,
    pub is_active: bool,
    pub workflow_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomaticMessageEntity {
    pub fn into_domain(self) -> Result<AutomaticMessage, StoreError> {
        let event_type = self
            .event_type
            .parse::<AutomaticEventType>()
            .map_err(StoreError::Corrupt)?;

        Ok(AutomaticMessage {
            id: self.id,
            shop_id: self.shop_id,
            event_type,
            template_name: self.template_name,
            content: self.content,
            is_active: self.is_active,
            workflow_id: self.workflow_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
