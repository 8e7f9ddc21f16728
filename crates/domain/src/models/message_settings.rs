//! Per-shop messaging configuration and credit balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

lazy_static::lazy_static! {
    /// Sender numbers or alphanumeric sender ids, hyphens allowed.
    pub static ref SENDER_IDENTITY_REGEX: regex::Regex =
        regex::Regex::new(r"^\+?[A-Za-z0-9][A-Za-z0-9-]{1,19}$").unwrap();
}

/// Errors raised by credit operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Credit amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: i64, available: i64 },
}

/// Messaging settings of one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSettings {
    pub id: i64,
    pub shop_id: i64,
    pub sender_identity: Option<String>,
    pub premium_channel_enabled: bool,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageSettings {
    /// Settings a shop starts with: no sender, no premium channel, no credits.
    pub fn new_default(shop_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            shop_id,
            sender_identity: None,
            premium_channel_enabled: false,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The configured sender, ignoring blank values.
    pub fn sender(&self) -> Option<&str> {
        self.sender_identity
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn spend(&mut self, amount: i64) -> Result<(), SettingsError> {
        if amount <= 0 {
            return Err(SettingsError::NonPositiveAmount(amount));
        }
        if amount > self.balance {
            return Err(SettingsError::InsufficientCredits {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn grant(&mut self, amount: i64) -> Result<(), SettingsError> {
        if amount <= 0 {
            return Err(SettingsError::NonPositiveAmount(amount));
        }
        self.balance += amount;
        Ok(())
    }

    pub fn update_sender_identity(
        &mut self,
        sender_identity: impl Into<String>,
        premium_channel_enabled: bool,
        now: DateTime<Utc>,
    ) {
        self.sender_identity = Some(sender_identity.into());
        self.premium_channel_enabled = premium_channel_enabled;
        self.updated_at = now;
    }
}

/// Request payload for updating the sender identity.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageSettingsRequest {
    #[validate(regex(
        path = "*SENDER_IDENTITY_REGEX",
        message = "senderIdentity must be 2-20 letters, digits or hyphens"
    ))]
    pub sender_identity: String,

    #[serde(default)]
    pub premium_channel_enabled: bool,
}

/// Request payload for changing the credit balance.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreditAmountRequest {
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MessageSettings {
        MessageSettings::new_default(1, Utc::now())
    }

    #[test]
    fn test_default_settings_have_no_sender() {
        let s = settings();
        assert!(s.sender().is_none());
        assert_eq!(s.balance, 0);
        assert!(!s.premium_channel_enabled);
    }

    #[test]
    fn test_blank_sender_is_treated_as_missing() {
        let mut s = settings();
        s.update_sender_identity("   ", false, Utc::now());
        assert!(s.sender().is_none());

        s.update_sender_identity("02-123-4567", true, Utc::now());
        assert_eq!(s.sender(), Some("02-123-4567"));
        assert!(s.premium_channel_enabled);
    }

    #[test]
    fn test_grant_requires_positive_amount() {
        let mut s = settings();
        assert_eq!(s.grant(0), Err(SettingsError::NonPositiveAmount(0)));
        assert_eq!(s.grant(-3), Err(SettingsError::NonPositiveAmount(-3)));
        s.grant(50).unwrap();
        assert_eq!(s.balance, 50);
    }

    #[test]
    fn test_spend_never_goes_negative() {
        let mut s = settings();
        s.grant(10).unwrap();

        assert_eq!(
            s.spend(11),
            Err(SettingsError::InsufficientCredits {
                requested: 11,
                available: 10
            })
        );
        assert_eq!(s.balance, 10);

        s.spend(10).unwrap();
        assert_eq!(s.balance, 0);
        assert!(s.spend(1).is_err());
    }

    #[test]
    fn test_sender_identity_validation() {
        let ok = UpdateMessageSettingsRequest {
            sender_identity: "010-1234-5678".to_string(),
            premium_channel_enabled: false,
        };
        assert!(ok.validate().is_ok());

        let bad = UpdateMessageSettingsRequest {
            sender_identity: "shop #1".to_string(),
            premium_channel_enabled: false,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_credit_amount_validation() {
        assert!(CreditAmountRequest { amount: 1 }.validate().is_ok());
        assert!(CreditAmountRequest { amount: 0 }.validate().is_err());
    }
}
