//! Message settings entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::MessageSettings;
use sqlx::FromRow;

/// Database row mapping for the message_settings table.
#[derive(Debug, Clone, FromRow)]
pub struct MessageSettingsEntity {
    pub id: i64,
    pub shop_id: i64,
    pub sender_identity: Option<String>,
    pub premium_channel_enabled: bool,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MessageSettingsEntity> for MessageSettings {
    fn from(entity: MessageSettingsEntity) -> Self {
        MessageSettings {
            id: entity.id,
            shop_id: entity.shop_id,
            sender_identity: entity.sender_identity,
            premium_channel_enabled: entity.premium_channel_enabled,
            balance: entity.balance,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
