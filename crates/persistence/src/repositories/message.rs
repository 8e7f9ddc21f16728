//! Message repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{Message, NewMessage};
use domain::stores::{DuePosition, MessageStore, StoreError};
use shared::pagination::PageRequest;
use sqlx::PgPool;

use crate::entities::MessageEntity;
use crate::metrics::QueryTimer;

/// Repository for message database operations.
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Creates a new MessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn mark(
        &self,
        query_name: &'static str,
        status: &str,
        ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let timer = QueryTimer::new(query_name);
        // sent_at is only stamped on success
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = $1,
                sent_at = CASE WHEN $1 = 'SENT' THEN $3 ELSE sent_at END,
                updated_at = $3
            WHERE id = ANY($2) AND status = 'PENDING'
            "#,
        )
        .bind(status)
        .bind(ids)
        .bind(at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected())
    }
}

#[async_trait::async_trait]
impl MessageStore for MessageRepository {
    async fn insert_batch(&self, messages: Vec<NewMessage>) -> Result<Vec<Message>, StoreError> {
        let timer = QueryTimer::new("insert_messages_batch");
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(messages.len());

        for message in messages {
            let entity = sqlx::query_as::<_, MessageEntity>(
                r#"
                INSERT INTO messages (
                    shop_id, customer_id, content, status, sending_type, message_kind,
                    scheduled_at, has_link, template_id, coupon_id, workflow_id,
                    customer_grade_id, tag_id, created_at, updated_at
                )
                VALUES ($1, $2, $3, 'PENDING', $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
                RETURNING id, shop_id, customer_id, content, status, sending_type, message_kind,
                          scheduled_at, sent_at, has_link, template_id, coupon_id, workflow_id,
                          customer_grade_id, tag_id, created_at, updated_at
                "#,
            )
            .bind(message.shop_id)
            .bind(message.customer_id)
            .bind(&message.content)
            .bind(message.sending_type.as_str())
            .bind(message.kind.as_str())
            .bind(message.scheduled_at)
            .bind(message.has_link)
            .bind(message.template_id)
            .bind(message.coupon_id)
            .bind(message.workflow_id)
            .bind(message.customer_grade_id)
            .bind(message.tag_id)
            .bind(message.created_at)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(entity.into_domain()?);
        }

        tx.commit().await?;
        timer.record();
        Ok(inserted)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, StoreError> {
        let timer = QueryTimer::new("find_message_by_id");
        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT id, shop_id, customer_id, content, status, sending_type, message_kind,
                   scheduled_at, sent_at, has_link, template_id, coupon_id, workflow_id,
                   customer_grade_id, tag_id, created_at, updated_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result?.map(MessageEntity::into_domain).transpose()
    }

    async fn find_due_reservations(
        &self,
        now: DateTime<Utc>,
        after: Option<DuePosition>,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let timer = QueryTimer::new("find_due_reservations");
        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT id, shop_id, customer_id, content, status, sending_type, message_kind,
                   scheduled_at, sent_at, has_link, template_id, coupon_id, workflow_id,
                   customer_grade_id, tag_id, created_at, updated_at
            FROM messages
            WHERE status = 'PENDING'
              AND sending_type = 'RESERVATION'
              AND scheduled_at <= $1
              AND ($2::timestamptz IS NULL OR (scheduled_at, id) > ($2, $3))
            ORDER BY scheduled_at ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(after.map(|(at, _)| at))
        .bind(after.map(|(_, id)| id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?.into_iter().map(MessageEntity::into_domain).collect()
    }

    async fn mark_sent(&self, ids: &[i64], sent_at: DateTime<Utc>) -> Result<u64, StoreError> {
        self.mark("mark_messages_sent", "SENT", ids, sent_at).await
    }

    async fn mark_failed(&self, ids: &[i64], failed_at: DateTime<Utc>) -> Result<u64, StoreError> {
        self.mark("mark_messages_failed", "FAIL", ids, failed_at).await
    }

    async fn save_pending(&self, message: &Message) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("save_pending_message");
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET customer_id = $2,
                content = $3,
                message_kind = $4,
                scheduled_at = $5,
                has_link = $6,
                status = $7,
                updated_at = $8
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(message.id)
        .bind(message.customer_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.scheduled_at)
        .bind(message.has_link)
        .bind(message.status.as_str())
        .bind(message.updated_at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() > 0)
    }

    async fn list_for_shop(
        &self,
        shop_id: i64,
        page: &PageRequest,
    ) -> Result<Vec<Message>, StoreError> {
        let timer = QueryTimer::new("list_messages_for_shop");
        let (cursor_at, cursor_id) = match page.cursor {
            Some(c) => (Some(c.created_at), Some(c.id)),
            None => (None, None),
        };

        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT id, shop_id, customer_id, content, status, sending_type, message_kind,
                   scheduled_at, sent_at, has_link, template_id, coupon_id, workflow_id,
                   customer_grade_id, tag_id, created_at, updated_at
            FROM messages
            WHERE shop_id = $1
              AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3))
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(shop_id)
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(page.fetch_limit())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result?.into_iter().map(MessageEntity::into_domain).collect()
    }
}
