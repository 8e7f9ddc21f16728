//! Read-only lookups into CRM reference tables.
//!
//! Customers, shops, templates and coupons are owned by other parts of the
//! CRM. This repository only reads them on behalf of the messaging pipeline.

use std::collections::HashMap;

use domain::models::AudienceFilter;
use domain::services::{
    AudienceSource, CouponValidator, RecipientDirectory, ShopDirectory, TemplateSource,
    VariableResolver,
};
use domain::stores::StoreError;
use sqlx::PgPool;

use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecipientDirectory for DirectoryRepository {
    async fn resolve_addresses(
        &self,
        customer_ids: &[i64],
    ) -> Result<HashMap<i64, String>, StoreError> {
        if customer_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let timer = QueryTimer::new("resolve_customer_addresses");
        let result: Result<Vec<(i64, String)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT id, phone_number
            FROM customers
            WHERE id = ANY($1)
              AND deleted_at IS NULL
              AND phone_number IS NOT NULL
              AND phone_number <> ''
            "#,
        )
        .bind(customer_ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result?.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl ShopDirectory for DirectoryRepository {
    async fn exists(&self, shop_id: i64) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("shop_exists");
        let result: Result<(bool,), sqlx::Error> =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM shops WHERE id = $1)")
                .bind(shop_id)
                .fetch_one(&self.pool)
                .await;
        timer.record();

        Ok(result?.0)
    }
}

#[async_trait::async_trait]
impl VariableResolver for DirectoryRepository {
    async fn payload(
        &self,
        shop_id: i64,
        customer_id: i64,
    ) -> Result<HashMap<String, String>, StoreError> {
        let timer = QueryTimer::new("resolve_message_variables");
        let result: Result<Option<(String, String)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT c.name, s.name
            FROM customers c
            JOIN shops s ON s.id = c.shop_id
            WHERE c.id = $2 AND c.shop_id = $1
            "#,
        )
        .bind(shop_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        let mut payload = HashMap::new();
        if let Some((customer_name, shop_name)) = result? {
            payload.insert("customerName".to_string(), customer_name);
            payload.insert("shopName".to_string(), shop_name);
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl TemplateSource for DirectoryRepository {
    async fn template_content(
        &self,
        shop_id: i64,
        template_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let timer = QueryTimer::new("find_message_template");
        let result: Result<Option<(String,)>, sqlx::Error> = sqlx::query_as(
            "SELECT content FROM message_templates WHERE id = $1 AND shop_id = $2",
        )
        .bind(template_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result?.map(|(content,)| content))
    }
}

#[async_trait::async_trait]
impl CouponValidator for DirectoryRepository {
    async fn is_valid(&self, shop_id: i64, coupon_id: i64) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("validate_coupon");
        let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM coupons
                WHERE id = $1
                  AND shop_id = $2
                  AND is_active
                  AND (expires_at IS NULL OR expires_at > NOW())
            )
            "#,
        )
        .bind(coupon_id)
        .bind(shop_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        Ok(result?.0)
    }
}

#[async_trait::async_trait]
impl AudienceSource for DirectoryRepository {
    async fn find_targets(
        &self,
        shop_id: i64,
        filter: &AudienceFilter,
        limit: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let timer = QueryTimer::new("find_workflow_targets");
        let result: Result<Vec<(i64,)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT c.id
            FROM customers c
            WHERE c.shop_id = $1
              AND c.deleted_at IS NULL
              AND (cardinality($2::bigint[]) = 0 OR c.grade_id = ANY($2))
              AND (cardinality($3::bigint[]) = 0 OR EXISTS (
                    SELECT 1 FROM customer_tags t
                    WHERE t.customer_id = c.id AND t.tag_id = ANY($3)))
              AND (NOT $4 OR c.last_visit_at >= NOW() - make_interval(months => $5))
              AND (NOT $6 OR NOT EXISTS (
                    SELECT 1 FROM messages m
                    WHERE m.customer_id = c.id
                      AND m.status = 'SENT'
                      AND m.sent_at >= NOW() - make_interval(days => $7)))
            ORDER BY c.id ASC
            LIMIT $8
            "#,
        )
        .bind(shop_id)
        .bind(&filter.customer_grade_ids)
        .bind(&filter.tag_ids)
        .bind(filter.exclude_dormant)
        .bind(filter.dormant_period_months)
        .bind(filter.exclude_recent_message_receivers)
        .bind(filter.recent_message_period_days)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result?.into_iter().map(|(id,)| id).collect())
    }
}
