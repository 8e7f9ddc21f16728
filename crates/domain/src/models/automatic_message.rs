//! Automatic message registrations.
//!
//! A shop registers at most one message per domain event; when the event
//! happens for one of its customers, that message is sent to the customer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Domain events that can emit an automatic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutomaticEventType {
    NewCustomer,
    ReservationCreated,
    SessionPassUsed,
    PrepaidUsed,
}

impl AutomaticEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomaticEventType::NewCustomer => "NEW_CUSTOMER",
            AutomaticEventType::ReservationCreated => "RESERVATION_CREATED",
            AutomaticEventType::SessionPassUsed => "SESSION_PASS_USED",
            AutomaticEventType::PrepaidUsed => "PREPAID_USED",
        }
    }

    /// Name given to the generated template.
    pub fn template_name(&self) -> &'static str {
        match self {
            AutomaticEventType::NewCustomer => "New customer welcome",
            AutomaticEventType::ReservationCreated => "Reservation confirmation",
            AutomaticEventType::SessionPassUsed => "Session pass usage notice",
            AutomaticEventType::PrepaidUsed => "Prepaid balance usage notice",
        }
    }
}

impl fmt::Display for AutomaticEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AutomaticEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW_CUSTOMER" => Ok(AutomaticEventType::NewCustomer),
            "RESERVATION_CREATED" => Ok(AutomaticEventType::ReservationCreated),
            "SESSION_PASS_USED" => Ok(AutomaticEventType::SessionPassUsed),
            "PREPAID_USED" => Ok(AutomaticEventType::PrepaidUsed),
            _ => Err(format!("Invalid automatic event type: {}", s)),
        }
    }
}

/// A registered automatic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticMessage {
    pub id: i64,
    pub shop_id: i64,
    pub event_type: AutomaticEventType,
    pub template_name: String,
    pub content: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomaticMessage {
    pub fn new(shop_id: i64, request: RegisterAutomaticMessageRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            shop_id,
            event_type: request.event_type,
            template_name: request.event_type.template_name().to_string(),
            content: request.content,
            is_active: request.is_active,
            workflow_id: request.workflow_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, request: UpdateAutomaticMessageRequest, now: DateTime<Utc>) {
        self.content = request.content;
        self.is_active = request.is_active;
        self.updated_at = now;
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAutomaticMessageRequest {
    pub event_type: AutomaticEventType,

    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Workflow recorded on every message this registration emits.
    #[serde(default)]
    pub workflow_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomaticMessageRequest {
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,

    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parse() {
        for e in [
            AutomaticEventType::NewCustomer,
            AutomaticEventType::ReservationCreated,
            AutomaticEventType::SessionPassUsed,
            AutomaticEventType::PrepaidUsed,
        ] {
            assert_eq!(e.as_str().parse::<AutomaticEventType>().unwrap(), e);
        }
        assert!("BIRTHDAY".parse::<AutomaticEventType>().is_err());
    }

    #[test]
    fn test_register_defaults_to_active_and_names_template() {
        let request: RegisterAutomaticMessageRequest =
            serde_json::from_str(r#"{"eventType":"NEW_CUSTOMER","content":"Welcome #{customerName}"}"#)
                .unwrap();
        assert!(request.validate().is_ok());

        let message = AutomaticMessage::new(1, request, Utc::now());
        assert!(message.is_active);
        assert_eq!(message.template_name, "New customer welcome");
        assert!(message.workflow_id.is_none());
    }

    #[test]
    fn test_update_replaces_content_and_flag() {
        let request = RegisterAutomaticMessageRequest {
            event_type: AutomaticEventType::PrepaidUsed,
            content: "Used".to_string(),
            is_active: true,
            workflow_id: Some(4),
        };
        let mut message = AutomaticMessage::new(2, request, Utc::now());
        message.update(
            UpdateAutomaticMessageRequest {
                content: "Balance used".to_string(),
                is_active: false,
            },
            Utc::now(),
        );
        assert_eq!(message.content, "Balance used");
        assert!(!message.is_active);
        assert_eq!(message.workflow_id, Some(4));
    }
}
