//! Typed trigger and action configuration for workflows.
//!
//! Requests carry a loosely shaped configuration object whose meaningful
//! fields depend on the declared trigger/action type. Building the typed form
//! is the single place where that dependency is checked; a persisted workflow
//! only ever holds the typed form.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Configuration that does not satisfy its declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{field} is required for {kind}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{field} is invalid for {kind}: {reason}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigurationError {
    /// Name of the offending field as it appears on the wire.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigurationError::MissingField { field, .. }
            | ConfigurationError::InvalidField { field, .. } => field,
        }
    }
}

// ============================================================================
// Trigger types
// ============================================================================

/// Broad grouping of trigger types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerCategory {
    Lifecycle,
    Periodic,
    Special,
    Prevention,
}

impl TriggerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCategory::Lifecycle => "lifecycle",
            TriggerCategory::Periodic => "periodic",
            TriggerCategory::Special => "special",
            TriggerCategory::Prevention => "prevention",
        }
    }
}

impl fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Condition that makes a workflow fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    NewCustomerFollowup,
    VipAttentionNeeded,
    VisitCycle,
    SpecificTreatment,
    Birthday,
    FirstVisitAnniversary,
    VisitMilestone,
    AmountMilestone,
    FirstVisitDaysAfter,
    NewCustomerAtRisk,
    ReactivationNeeded,
    GrowingDelayed,
    LoyalDelayed,
    ChurnRiskHigh,
}

impl TriggerType {
    pub const ALL: [TriggerType; 14] = [
        TriggerType::NewCustomerFollowup,
        TriggerType::VipAttentionNeeded,
        TriggerType::VisitCycle,
        TriggerType::SpecificTreatment,
        TriggerType::Birthday,
        TriggerType::FirstVisitAnniversary,
        TriggerType::VisitMilestone,
        TriggerType::AmountMilestone,
        TriggerType::FirstVisitDaysAfter,
        TriggerType::NewCustomerAtRisk,
        TriggerType::ReactivationNeeded,
        TriggerType::GrowingDelayed,
        TriggerType::LoyalDelayed,
        TriggerType::ChurnRiskHigh,
    ];

    /// Trigger types evaluated on a calendar rather than by an event.
    pub const TIME_BASED: [TriggerType; 4] = [
        TriggerType::Birthday,
        TriggerType::FirstVisitAnniversary,
        TriggerType::VisitCycle,
        TriggerType::ChurnRiskHigh,
    ];

    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::NewCustomerFollowup => "new-customer-followup",
            TriggerType::VipAttentionNeeded => "vip-attention-needed",
            TriggerType::VisitCycle => "visit-cycle",
            TriggerType::SpecificTreatment => "specific-treatment",
            TriggerType::Birthday => "birthday",
            TriggerType::FirstVisitAnniversary => "first-visit-anniversary",
            TriggerType::VisitMilestone => "visit-milestone",
            TriggerType::AmountMilestone => "amount-milestone",
            TriggerType::FirstVisitDaysAfter => "first-visit-days-after",
            TriggerType::NewCustomerAtRisk => "new-customer-at-risk",
            TriggerType::ReactivationNeeded => "reactivation-needed",
            TriggerType::GrowingDelayed => "growing-delayed",
            TriggerType::LoyalDelayed => "loyal-delayed",
            TriggerType::ChurnRiskHigh => "churn-risk-high",
        }
    }

    pub fn category(&self) -> TriggerCategory {
        match self {
            TriggerType::NewCustomerFollowup | TriggerType::VipAttentionNeeded => {
                TriggerCategory::Lifecycle
            }
            TriggerType::VisitCycle | TriggerType::SpecificTreatment => TriggerCategory::Periodic,
            TriggerType::Birthday
            | TriggerType::FirstVisitAnniversary
            | TriggerType::VisitMilestone
            | TriggerType::AmountMilestone
            | TriggerType::FirstVisitDaysAfter => TriggerCategory::Special,
            TriggerType::NewCustomerAtRisk
            | TriggerType::ReactivationNeeded
            | TriggerType::GrowingDelayed
            | TriggerType::LoyalDelayed
            | TriggerType::ChurnRiskHigh => TriggerCategory::Prevention,
        }
    }

    /// Delay between two scheduled firings of a workflow with this trigger.
    pub fn rerun_interval(&self) -> chrono::Duration {
        match self {
            TriggerType::ChurnRiskHigh => chrono::Duration::weeks(1),
            _ => chrono::Duration::days(1),
        }
    }

    pub fn is_time_based(&self) -> bool {
        Self::TIME_BASED.contains(self)
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid trigger type: {}", s))
    }
}

/// Trigger configuration as received on the wire. Which fields matter
/// depends on the trigger type it is paired with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfigInput {
    pub followup_days: Option<i32>,
    pub visit_cycle_days: Option<i32>,
    pub treatment_id: Option<String>,
    pub days_after_treatment: Option<i32>,
    pub birthday_days_before: Option<i32>,
    pub visit_milestone: Option<i32>,
    pub amount_milestone: Option<i64>,
    pub days_after_first_visit: Option<i32>,
}

/// Validated trigger with exactly the configuration its type needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "triggerType",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum TriggerConfig {
    NewCustomerFollowup { followup_days: i32 },
    VipAttentionNeeded,
    VisitCycle { visit_cycle_days: i32 },
    SpecificTreatment {
        treatment_id: String,
        days_after_treatment: Option<i32>,
    },
    Birthday { birthday_days_before: i32 },
    FirstVisitAnniversary,
    VisitMilestone { visit_milestone: i32 },
    AmountMilestone { amount_milestone: i64 },
    FirstVisitDaysAfter { days_after_first_visit: i32 },
    NewCustomerAtRisk,
    ReactivationNeeded,
    GrowingDelayed,
    LoyalDelayed,
    ChurnRiskHigh,
}

fn positive<T>(kind: &'static str, field: &'static str, value: Option<T>) -> Result<T, ConfigurationError>
where
    T: PartialOrd + Default + Copy,
{
    match value {
        None => Err(ConfigurationError::MissingField { kind, field }),
        Some(v) if v > T::default() => Ok(v),
        Some(_) => Err(ConfigurationError::InvalidField {
            kind,
            field,
            reason: "must be greater than zero",
        }),
    }
}

fn non_negative(
    kind: &'static str,
    field: &'static str,
    value: Option<i32>,
) -> Result<i32, ConfigurationError> {
    match value {
        None => Err(ConfigurationError::MissingField { kind, field }),
        Some(v) if v >= 0 => Ok(v),
        Some(_) => Err(ConfigurationError::InvalidField {
            kind,
            field,
            reason: "must not be negative",
        }),
    }
}

fn required_text(
    kind: &'static str,
    field: &'static str,
    value: Option<&String>,
) -> Result<String, ConfigurationError> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v.to_string()),
        None => Err(ConfigurationError::MissingField { kind, field }),
    }
}

impl TriggerConfig {
    /// Builds the typed trigger for `trigger_type`, naming the first field
    /// that is missing or out of range.
    pub fn build(
        trigger_type: TriggerType,
        input: &TriggerConfigInput,
    ) -> Result<Self, ConfigurationError> {
        let kind = trigger_type.as_str();
        let config = match trigger_type {
            TriggerType::NewCustomerFollowup => TriggerConfig::NewCustomerFollowup {
                followup_days: positive(kind, "followupDays", input.followup_days)?,
            },
            TriggerType::VipAttentionNeeded => TriggerConfig::VipAttentionNeeded,
            TriggerType::VisitCycle => TriggerConfig::VisitCycle {
                visit_cycle_days: positive(kind, "visitCycleDays", input.visit_cycle_days)?,
            },
            TriggerType::SpecificTreatment => {
                let days_after_treatment = match input.days_after_treatment {
                    Some(days) => Some(non_negative(kind, "daysAfterTreatment", Some(days))?),
                    None => None,
                };
                TriggerConfig::SpecificTreatment {
                    treatment_id: required_text(kind, "treatmentId", input.treatment_id.as_ref())?,
                    days_after_treatment,
                }
            }
            TriggerType::Birthday => TriggerConfig::Birthday {
                birthday_days_before: non_negative(
                    kind,
                    "birthdayDaysBefore",
                    input.birthday_days_before,
                )?,
            },
            TriggerType::FirstVisitAnniversary => TriggerConfig::FirstVisitAnniversary,
            TriggerType::VisitMilestone => TriggerConfig::VisitMilestone {
                visit_milestone: positive(kind, "visitMilestone", input.visit_milestone)?,
            },
            TriggerType::AmountMilestone => TriggerConfig::AmountMilestone {
                amount_milestone: positive(kind, "amountMilestone", input.amount_milestone)?,
            },
            TriggerType::FirstVisitDaysAfter => TriggerConfig::FirstVisitDaysAfter {
                days_after_first_visit: positive(
                    kind,
                    "daysAfterFirstVisit",
                    input.days_after_first_visit,
                )?,
            },
            TriggerType::NewCustomerAtRisk => TriggerConfig::NewCustomerAtRisk,
            TriggerType::ReactivationNeeded => TriggerConfig::ReactivationNeeded,
            TriggerType::GrowingDelayed => TriggerConfig::GrowingDelayed,
            TriggerType::LoyalDelayed => TriggerConfig::LoyalDelayed,
            TriggerType::ChurnRiskHigh => TriggerConfig::ChurnRiskHigh,
        };
        Ok(config)
    }

    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerConfig::NewCustomerFollowup { .. } => TriggerType::NewCustomerFollowup,
            TriggerConfig::VipAttentionNeeded => TriggerType::VipAttentionNeeded,
            TriggerConfig::VisitCycle { .. } => TriggerType::VisitCycle,
            TriggerConfig::SpecificTreatment { .. } => TriggerType::SpecificTreatment,
            TriggerConfig::Birthday { .. } => TriggerType::Birthday,
            TriggerConfig::FirstVisitAnniversary => TriggerType::FirstVisitAnniversary,
            TriggerConfig::VisitMilestone { .. } => TriggerType::VisitMilestone,
            TriggerConfig::AmountMilestone { .. } => TriggerType::AmountMilestone,
            TriggerConfig::FirstVisitDaysAfter { .. } => TriggerType::FirstVisitDaysAfter,
            TriggerConfig::NewCustomerAtRisk => TriggerType::NewCustomerAtRisk,
            TriggerConfig::ReactivationNeeded => TriggerType::ReactivationNeeded,
            TriggerConfig::GrowingDelayed => TriggerType::GrowingDelayed,
            TriggerConfig::LoyalDelayed => TriggerType::LoyalDelayed,
            TriggerConfig::ChurnRiskHigh => TriggerType::ChurnRiskHigh,
        }
    }

    pub fn category(&self) -> TriggerCategory {
        self.trigger_type().category()
    }
}

// ============================================================================
// Action types
// ============================================================================

/// What a workflow does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    MessageOnly,
    CouponMessage,
    SystemNotification,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::MessageOnly => "message-only",
            ActionType::CouponMessage => "coupon-message",
            ActionType::SystemNotification => "system-notification",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message-only" => Ok(ActionType::MessageOnly),
            "coupon-message" => Ok(ActionType::CouponMessage),
            "system-notification" => Ok(ActionType::SystemNotification),
            _ => Err(format!("Invalid action type: {}", s)),
        }
    }
}

/// Severity of an internal notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "INFO",
            NotificationLevel::Warning => "WARNING",
            NotificationLevel::Error => "ERROR",
        }
    }
}

/// Personalization options shared by the message-producing actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryOptions {
    pub use_personalization: bool,
    pub fallback_message: Option<String>,
}

/// Action configuration as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfigInput {
    pub message_template_id: Option<i64>,
    pub send_time: Option<NaiveTime>,
    pub coupon_id: Option<i64>,
    pub notification_title: Option<String>,
    pub notification_content: Option<String>,
    pub notification_level: Option<NotificationLevel>,
    pub use_personalization: Option<bool>,
    pub fallback_message: Option<String>,
}

/// Validated action with exactly the configuration its type needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "actionType",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ActionConfig {
    MessageOnly {
        message_template_id: i64,
        send_time: NaiveTime,
        #[serde(default)]
        delivery: DeliveryOptions,
    },
    CouponMessage {
        message_template_id: i64,
        send_time: NaiveTime,
        coupon_id: i64,
        #[serde(default)]
        delivery: DeliveryOptions,
    },
    SystemNotification {
        notification_title: String,
        notification_content: String,
        #[serde(default)]
        notification_level: NotificationLevel,
    },
}

impl ActionConfig {
    pub fn build(
        action_type: ActionType,
        input: &ActionConfigInput,
    ) -> Result<Self, ConfigurationError> {
        let kind = action_type.as_str();
        let delivery = || DeliveryOptions {
            use_personalization: input.use_personalization.unwrap_or(false),
            fallback_message: input
                .fallback_message
                .clone()
                .filter(|m| !m.trim().is_empty()),
        };
        let send_time = || {
            input
                .send_time
                .ok_or(ConfigurationError::MissingField { kind, field: "sendTime" })
        };

        let config = match action_type {
            ActionType::MessageOnly => ActionConfig::MessageOnly {
                message_template_id: positive(kind, "messageTemplateId", input.message_template_id)?,
                send_time: send_time()?,
                delivery: delivery(),
            },
            ActionType::CouponMessage => ActionConfig::CouponMessage {
                message_template_id: positive(kind, "messageTemplateId", input.message_template_id)?,
                send_time: send_time()?,
                coupon_id: positive(kind, "couponId", input.coupon_id)?,
                delivery: delivery(),
            },
            ActionType::SystemNotification => ActionConfig::SystemNotification {
                notification_title: required_text(
                    kind,
                    "notificationTitle",
                    input.notification_title.as_ref(),
                )?,
                notification_content: required_text(
                    kind,
                    "notificationContent",
                    input.notification_content.as_ref(),
                )?,
                notification_level: input.notification_level.unwrap_or_default(),
            },
        };
        Ok(config)
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            ActionConfig::MessageOnly { .. } => ActionType::MessageOnly,
            ActionConfig::CouponMessage { .. } => ActionType::CouponMessage,
            ActionConfig::SystemNotification { .. } => ActionType::SystemNotification,
        }
    }

    /// Template and send time of message-producing actions.
    pub fn message_template(&self) -> Option<(i64, NaiveTime)> {
        match self {
            ActionConfig::MessageOnly {
                message_template_id,
                send_time,
                ..
            }
            | ActionConfig::CouponMessage {
                message_template_id,
                send_time,
                ..
            } => Some((*message_template_id, *send_time)),
            ActionConfig::SystemNotification { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_type_codes_round_trip() {
        for t in TriggerType::ALL {
            assert_eq!(t.as_str().parse::<TriggerType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert!("anniversary".parse::<TriggerType>().is_err());
    }

    #[test]
    fn test_trigger_categories() {
        assert_eq!(TriggerType::NewCustomerFollowup.category(), TriggerCategory::Lifecycle);
        assert_eq!(TriggerType::SpecificTreatment.category(), TriggerCategory::Periodic);
        assert_eq!(TriggerType::AmountMilestone.category(), TriggerCategory::Special);
        assert_eq!(TriggerType::LoyalDelayed.category(), TriggerCategory::Prevention);
    }

    #[test]
    fn test_rerun_interval() {
        assert_eq!(TriggerType::ChurnRiskHigh.rerun_interval(), chrono::Duration::weeks(1));
        assert_eq!(TriggerType::Birthday.rerun_interval(), chrono::Duration::days(1));
    }

    #[test]
    fn test_visit_cycle_requires_positive_days() {
        let empty = TriggerConfigInput::default();
        let err = TriggerConfig::build(TriggerType::VisitCycle, &empty).unwrap_err();
        assert_eq!(err.field(), "visitCycleDays");
        assert!(matches!(err, ConfigurationError::MissingField { .. }));

        let zero = TriggerConfigInput {
            visit_cycle_days: Some(0),
            ..Default::default()
        };
        let err = TriggerConfig::build(TriggerType::VisitCycle, &zero).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidField { .. }));

        let ok = TriggerConfigInput {
            visit_cycle_days: Some(30),
            ..Default::default()
        };
        assert_eq!(
            TriggerConfig::build(TriggerType::VisitCycle, &ok).unwrap(),
            TriggerConfig::VisitCycle {
                visit_cycle_days: 30
            }
        );
    }

    #[test]
    fn test_birthday_allows_zero_lead_time() {
        let input = TriggerConfigInput {
            birthday_days_before: Some(0),
            ..Default::default()
        };
        assert!(TriggerConfig::build(TriggerType::Birthday, &input).is_ok());

        let negative = TriggerConfigInput {
            birthday_days_before: Some(-1),
            ..Default::default()
        };
        assert!(TriggerConfig::build(TriggerType::Birthday, &negative).is_err());
    }

    #[test]
    fn test_amount_milestone_and_treatment() {
        let input = TriggerConfigInput {
            amount_milestone: Some(1_000_000),
            ..Default::default()
        };
        assert!(TriggerConfig::build(TriggerType::AmountMilestone, &input).is_ok());

        let blank = TriggerConfigInput {
            treatment_id: Some("  ".to_string()),
            ..Default::default()
        };
        let err = TriggerConfig::build(TriggerType::SpecificTreatment, &blank).unwrap_err();
        assert_eq!(err.field(), "treatmentId");
    }

    #[test]
    fn test_config_free_triggers_ignore_input() {
        let input = TriggerConfigInput {
            visit_cycle_days: Some(-4),
            ..Default::default()
        };
        for t in [
            TriggerType::VipAttentionNeeded,
            TriggerType::FirstVisitAnniversary,
            TriggerType::ChurnRiskHigh,
        ] {
            let config = TriggerConfig::build(t, &input).unwrap();
            assert_eq!(config.trigger_type(), t);
        }
    }

    #[test]
    fn test_trigger_config_serializes_with_tag() {
        let config = TriggerConfig::Birthday {
            birthday_days_before: 3,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["triggerType"], "birthday");
        assert_eq!(json["birthdayDaysBefore"], 3);
        let back: TriggerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_message_action_requires_template_and_time() {
        let missing_time = ActionConfigInput {
            message_template_id: Some(3),
            ..Default::default()
        };
        let err = ActionConfig::build(ActionType::MessageOnly, &missing_time).unwrap_err();
        assert_eq!(err.field(), "sendTime");

        let missing_template = ActionConfigInput {
            send_time: NaiveTime::from_hms_opt(9, 0, 0),
            ..Default::default()
        };
        let err = ActionConfig::build(ActionType::MessageOnly, &missing_template).unwrap_err();
        assert_eq!(err.field(), "messageTemplateId");
    }

    #[test]
    fn test_coupon_action_requires_coupon() {
        let input = ActionConfigInput {
            message_template_id: Some(3),
            send_time: NaiveTime::from_hms_opt(9, 0, 0),
            ..Default::default()
        };
        let err = ActionConfig::build(ActionType::CouponMessage, &input).unwrap_err();
        assert_eq!(err.field(), "couponId");

        let with_coupon = ActionConfigInput {
            coupon_id: Some(12),
            ..input
        };
        let config = ActionConfig::build(ActionType::CouponMessage, &with_coupon).unwrap();
        assert_eq!(config.action_type(), ActionType::CouponMessage);
        assert_eq!(
            config.message_template(),
            Some((3, NaiveTime::from_hms_opt(9, 0, 0).unwrap()))
        );
    }

    #[test]
    fn test_notification_action_requires_text() {
        let input = ActionConfigInput {
            notification_title: Some("VIP visit".to_string()),
            notification_content: Some("".to_string()),
            ..Default::default()
        };
        let err = ActionConfig::build(ActionType::SystemNotification, &input).unwrap_err();
        assert_eq!(err.field(), "notificationContent");

        let ok = ActionConfigInput {
            notification_content: Some("Call them back".to_string()),
            ..input
        };
        let config = ActionConfig::build(ActionType::SystemNotification, &ok).unwrap();
        assert!(config.message_template().is_none());
        assert!(matches!(
            config,
            ActionConfig::SystemNotification {
                notification_level: NotificationLevel::Info,
                ..
            }
        ));
    }
}
