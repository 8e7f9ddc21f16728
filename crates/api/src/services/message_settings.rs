//! Per-shop sender identity and credit balance.

use std::sync::Arc;

use chrono::Utc;
use domain::models::message_settings::{CreditAmountRequest, UpdateMessageSettingsRequest};
use domain::models::{MessageSettings, SettingsError};
use domain::services::ShopDirectory;
use domain::stores::{MessageSettingsStore, StoreError};
use domain::{DomainError, DomainResult};
use tracing::info;
use validator::Validate;

use super::Dependencies;

pub struct MessageSettingsService {
    settings: Arc<dyn MessageSettingsStore>,
    shops: Arc<dyn ShopDirectory>,
}

impl MessageSettingsService {
    pub fn new(deps: &Dependencies) -> Self {
        Self {
            settings: deps.settings.clone(),
            shops: deps.shops.clone(),
        }
    }

    /// Creates the default settings row for a shop.
    pub async fn create(&self, shop_id: i64) -> DomainResult<MessageSettings> {
        if !self.shops.exists(shop_id).await? {
            return Err(DomainError::not_found("Shop", shop_id));
        }

        let settings = MessageSettings::new_default(shop_id, Utc::now());
        let created = self.settings.create(&settings).await.map_err(|e| match e {
            StoreError::Duplicate(_) => {
                DomainError::Conflict(format!("Shop {} already has message settings", shop_id))
            }
            other => other.into(),
        })?;

        info!(shop_id = shop_id, "Message settings created");
        Ok(created)
    }

    pub async fn get(&self, shop_id: i64) -> DomainResult<MessageSettings> {
        self.settings
            .find_by_shop(shop_id)
            .await?
            .ok_or_else(|| DomainError::not_found("MessageSettings", shop_id))
    }

    pub async fn update_sender(
        &self,
        shop_id: i64,
        request: UpdateMessageSettingsRequest,
    ) -> DomainResult<MessageSettings> {
        request.validate()?;
        let updated = self
            .settings
            .update_sender(
                shop_id,
                request.sender_identity.trim(),
                request.premium_channel_enabled,
                Utc::now(),
            )
            .await?
            .ok_or_else(|| DomainError::not_found("MessageSettings", shop_id))?;

        info!(
            shop_id = shop_id,
            premium_channel_enabled = updated.premium_channel_enabled,
            "Sender identity updated"
        );
        Ok(updated)
    }

    pub async fn grant(
        &self,
        shop_id: i64,
        request: CreditAmountRequest,
    ) -> DomainResult<MessageSettings> {
        ensure_positive(request.amount)?;
        let updated = self
            .settings
            .grant(shop_id, request.amount, Utc::now())
            .await?
            .ok_or_else(|| DomainError::not_found("MessageSettings", shop_id))?;

        info!(shop_id = shop_id, amount = request.amount, balance = updated.balance, "Credits granted");
        Ok(updated)
    }

    /// Removes credits; the balance never goes below zero.
    pub async fn spend(&self, shop_id: i64, amount: i64) -> DomainResult<MessageSettings> {
        ensure_positive(amount)?;
        if let Some(updated) = self.settings.spend(shop_id, amount, Utc::now()).await? {
            return Ok(updated);
        }

        // Either the shop has no settings or the balance was too low.
        let current = self.get(shop_id).await?;
        Err(SettingsError::InsufficientCredits {
            requested: amount,
            available: current.balance,
        }
        .into())
    }
}

fn ensure_positive(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(SettingsError::NonPositiveAmount(amount).into());
    }
    Ok(())
}
