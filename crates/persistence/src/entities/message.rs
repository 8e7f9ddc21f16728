//! Message entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Message, MessageKind, MessageStatus, SendingType};
use domain::stores::StoreError;
use sqlx::FromRow;

/// Database row mapping for the messages table.
#[derive(Debug, Clone, FromRow)]
pub struct MessageEntity {
    pub id: i64,
    pub shop_id: i64,
    pub customer_id: i64,
    pub content: String,
    pub status: String,
    pub sending_type: String,
    pub message_kind: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub has_link: bool,
    pub template_id: Option<i64>,
    pub coupon_id: Option<i64>,
    pub workflow_id: Option<i64>,
    pub customer_grade_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageEntity {
    /// Convert to domain model. Unknown enum values mean the row is corrupt.
    pub fn into_domain(self) -> Result<Message, StoreError> {
        let status = self
            .status
            .parse::<MessageStatus>()
            .map_err(StoreError::Corrupt)?;
        let sending_type = self
            .sending_type
            .parse::<SendingType>()
            .map_err(StoreError::Corrupt)?;
        let kind = self
            .message_kind
            .parse::<MessageKind>()
            .map_err(StoreError::Corrupt)?;

        Ok(Message {
            id: self.id,
            shop_id: self.shop_id,
            customer_id: self.customer_id,
            content: self.content,
            status,
            sending_type,
            kind,
            scheduled_at: self.scheduled_at,
            sent_at: self.sent_at,
            has_link: self.has_link,
            template_id: self.template_id,
            coupon_id: self.coupon_id,
            workflow_id: self.workflow_id,
            customer_grade_id: self.customer_grade_id,
            tag_id: self.tag_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<MessageEntity> for Message {
    type Error = StoreError;

    fn try_from(entity: MessageEntity) -> Result<Self, Self::Error> {
        entity.into_domain()
    }
}
