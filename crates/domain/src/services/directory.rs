//! Lookups into data owned by the rest of the CRM.
//!
//! Customer profiles, shops, templates and coupons are managed elsewhere;
//! the messaging pipeline only reads them through these traits.

use std::collections::HashMap;

use crate::models::AudienceFilter;
use crate::stores::StoreError;

/// Resolves customers to their contact addresses.
#[async_trait::async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Batch lookup. Customers without an address are absent from the map.
    async fn resolve_addresses(
        &self,
        customer_ids: &[i64],
    ) -> Result<HashMap<i64, String>, StoreError>;

    async fn resolve_address(&self, customer_id: i64) -> Result<Option<String>, StoreError> {
        let mut addresses = self.resolve_addresses(&[customer_id]).await?;
        Ok(addresses.remove(&customer_id))
    }
}

#[async_trait::async_trait]
pub trait ShopDirectory: Send + Sync {
    async fn exists(&self, shop_id: i64) -> Result<bool, StoreError>;
}

/// Supplies the values substituted into `#{key}` placeholders.
#[async_trait::async_trait]
pub trait VariableResolver: Send + Sync {
    async fn payload(
        &self,
        shop_id: i64,
        customer_id: i64,
    ) -> Result<HashMap<String, String>, StoreError>;
}

#[async_trait::async_trait]
pub trait TemplateSource: Send + Sync {
    /// Body text of a shop's template, if it exists.
    async fn template_content(
        &self,
        shop_id: i64,
        template_id: i64,
    ) -> Result<Option<String>, StoreError>;
}

#[async_trait::async_trait]
pub trait CouponValidator: Send + Sync {
    /// Whether the coupon exists, belongs to the shop and can still be issued.
    async fn is_valid(&self, shop_id: i64, coupon_id: i64) -> Result<bool, StoreError>;
}

/// Selects the customers a workflow addresses.
#[async_trait::async_trait]
pub trait AudienceSource: Send + Sync {
    async fn find_targets(
        &self,
        shop_id: i64,
        filter: &AudienceFilter,
        limit: i64,
    ) -> Result<Vec<i64>, StoreError>;
}

/// Replaces every `#{key}` whose key is in `payload`. Unknown keys are kept
/// verbatim so a missing value is visible rather than silently blank.
pub fn substitute_variables(template: &str, payload: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("#{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match payload.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
