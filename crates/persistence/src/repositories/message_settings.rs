//! Message settings repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::MessageSettings;
use domain::stores::{MessageSettingsStore, StoreError};
use sqlx::PgPool;

use super::map_unique_violation;
use crate::entities::MessageSettingsEntity;
use crate::metrics::QueryTimer;

/// Repository for per-shop message settings.
#[derive(Clone)]
pub struct MessageSettingsRepository {
    pool: PgPool,
}

impl MessageSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageSettingsStore for MessageSettingsRepository {
    async fn create(&self, settings: &MessageSettings) -> Result<MessageSettings, StoreError> {
        let timer = QueryTimer::new("create_message_settings");
        let result = sqlx::query_as::<_, MessageSettingsEntity>(
            r#"
            INSERT INTO message_settings (
                shop_id, sender_identity, premium_channel_enabled, balance, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, shop_id, sender_identity, premium_channel_enabled, balance,
                      created_at, updated_at
            "#,
        )
        .bind(settings.shop_id)
        .bind(&settings.sender_identity)
        .bind(settings.premium_channel_enabled)
        .bind(settings.balance)
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result
            .map(MessageSettings::from)
            .map_err(|e| map_unique_violation(e, "message settings for shop"))
    }

    async fn find_by_shop(&self, shop_id: i64) -> Result<Option<MessageSettings>, StoreError> {
        let timer = QueryTimer::new("find_message_settings_by_shop");
        let result = sqlx::query_as::<_, MessageSettingsEntity>(
            r#"
            SELECT id, shop_id, sender_identity, premium_channel_enabled, balance,
                   created_at, updated_at
            FROM message_settings
            WHERE shop_id = $1
            "#,
        )
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(MessageSettings::from))
    }

    async fn update_sender(
        &self,
        shop_id: i64,
        sender_identity: &str,
        premium_channel_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError> {
        let timer = QueryTimer::new("update_message_sender");
        let result = sqlx::query_as::<_, MessageSettingsEntity>(
            r#"
            UPDATE message_settings
            SET sender_identity = $2, premium_channel_enabled = $3, updated_at = $4
            WHERE shop_id = $1
            RETURNING id, shop_id, sender_identity, premium_channel_enabled, balance,
                      created_at, updated_at
            "#,
        )
        .bind(shop_id)
        .bind(sender_identity)
        .bind(premium_channel_enabled)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(MessageSettings::from))
    }

    async fn grant(
        &self,
        shop_id: i64,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError> {
        let timer = QueryTimer::new("grant_message_credits");
        let result = sqlx::query_as::<_, MessageSettingsEntity>(
            r#"
            UPDATE message_settings
            SET balance = balance + $2, updated_at = $3
            WHERE shop_id = $1
            RETURNING id, shop_id, sender_identity, premium_channel_enabled, balance,
                      created_at, updated_at
            "#,
        )
        .bind(shop_id)
        .bind(amount)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(MessageSettings::from))
    }

    async fn spend(
        &self,
        shop_id: i64,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageSettings>, StoreError> {
        let timer = QueryTimer::new("spend_message_credits");
        // The balance guard in the WHERE clause makes the decrement atomic.
        let result = sqlx::query_as::<_, MessageSettingsEntity>(
            r#"
            UPDATE message_settings
            SET balance = balance - $2, updated_at = $3
            WHERE shop_id = $1 AND balance >= $2
            RETURNING id, shop_id, sender_identity, premium_channel_enabled, balance,
                      created_at, updated_at
            "#,
        )
        .bind(shop_id)
        .bind(amount)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(MessageSettings::from))
    }
}
