//! Automatic message repository for database operations.

use domain::models::{AutomaticEventType, AutomaticMessage};
use domain::stores::{AutomaticMessageStore, StoreError};
use sqlx::PgPool;

use super::map_unique_violation;
use crate::entities::AutomaticMessageEntity;
use crate::metrics::QueryTimer;

/// Repository for automatic message registrations.
#[derive(Clone)]
pub struct AutomaticMessageRepository {
    pool: PgPool,
}

impl AutomaticMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AutomaticMessageStore for AutomaticMessageRepository {
    async fn create(&self, message: &AutomaticMessage) -> Result<AutomaticMessage, StoreError> {
        let timer = QueryTimer::new("create_automatic_message");
        let result = sqlx::query_as::<_, AutomaticMessageEntity>(
            r#"
            INSERT INTO automatic_messages (
                shop_id, event_type, template_name, content, is_active, workflow_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, shop_id, event_type, template_name, content, is_active, workflow_id,
                      created_at, updated_at
            "#,
        )
        .bind(message.shop_id)
        .bind(message.event_type.as_str())
        .bind(&message.template_name)
        .bind(&message.content)
        .bind(message.is_active)
        .bind(message.workflow_id)
        .bind(message.created_at)
        .bind(message.updated_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result
            .map_err(|e| map_unique_violation(e, "automatic message for event"))?
            .into_domain()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AutomaticMessage>, StoreError> {
        let timer = QueryTimer::new("find_automatic_message_by_id");
        let result = sqlx::query_as::<_, AutomaticMessageEntity>(
            r#"
            SELECT id, shop_id, event_type, template_name, content, is_active, workflow_id,
                   created_at, updated_at
            FROM automatic_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result?.map(AutomaticMessageEntity::into_domain).transpose()
    }

    async fn find_by_event(
        &self,
        shop_id: i64,
        event_type: AutomaticEventType,
    ) -> Result<Option<AutomaticMessage>, StoreError> {
        let timer = QueryTimer::new("find_automatic_message_by_event");
        let result = sqlx::query_as::<_, AutomaticMessageEntity>(
            r#"
            SELECT id, shop_id, event_type, template_name, content, is_active, workflow_id,
                   created_at, updated_at
            FROM automatic_messages
            WHERE shop_id = $1 AND event_type = $2
            "#,
        )
        .bind(shop_id)
        .bind(event_type.as_str())
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result?.map(AutomaticMessageEntity::into_domain).transpose()
    }

    async fn update(&self, message: &AutomaticMessage) -> Result<AutomaticMessage, StoreError> {
        let timer = QueryTimer::new("update_automatic_message");
        let result = sqlx::query_as::<_, AutomaticMessageEntity>(
            r#"
            UPDATE automatic_messages
            SET content = $2, is_active = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, shop_id, event_type, template_name, content, is_active, workflow_id,
                      created_at, updated_at
            "#,
        )
        .bind(message.id)
        .bind(&message.content)
        .bind(message.is_active)
        .bind(message.updated_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result?.into_domain()
    }

    async fn list_for_shop(&self, shop_id: i64) -> Result<Vec<AutomaticMessage>, StoreError> {
        let timer = QueryTimer::new("list_automatic_messages_for_shop");
        let result = sqlx::query_as::<_, AutomaticMessageEntity>(
            r#"
            SELECT id, shop_id, event_type, template_name, content, is_active, workflow_id,
                   created_at, updated_at
            FROM automatic_messages
            WHERE shop_id = $1
            ORDER BY event_type ASC
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?.into_iter().map(AutomaticMessageEntity::into_domain).collect()
    }
}
