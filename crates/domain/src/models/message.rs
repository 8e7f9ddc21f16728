//! Outbound message domain model.
//!
//! A message is one communication unit addressed to one customer. Its
//! delivery status only ever moves forward out of `PENDING`; terminal rows are
//! kept as the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use validator::Validate;

/// Maximum length of a message body.
pub const MAX_CONTENT_LENGTH: u64 = 500;

// ============================================================================
// Enums
// ============================================================================

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Fail,
    Cancelled,
}

impl MessageStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Fail => "FAIL",
            MessageStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }

    /// Check if transition to target status is valid.
    pub fn can_transition_to(&self, target: MessageStatus) -> bool {
        matches!(
            (self, target),
            (MessageStatus::Pending, MessageStatus::Sent)
                | (MessageStatus::Pending, MessageStatus::Fail)
                | (MessageStatus::Pending, MessageStatus::Cancelled)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MessageStatus::Pending),
            "SENT" => Ok(MessageStatus::Sent),
            "FAIL" => Ok(MessageStatus::Fail),
            "CANCELLED" => Ok(MessageStatus::Cancelled),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// How a message is scheduled for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendingType {
    /// Sent right after the request that created it commits.
    Immediate,
    /// Held until its scheduled time and sent by the dispatcher.
    Reservation,
    /// Emitted by an automatic-message trigger; sent like `Immediate`.
    Automatic,
}

impl SendingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendingType::Immediate => "IMMEDIATE",
            SendingType::Reservation => "RESERVATION",
            SendingType::Automatic => "AUTOMATIC",
        }
    }

    /// Whether messages of this type carry their own future schedule time.
    pub fn is_reservation(&self) -> bool {
        matches!(self, SendingType::Reservation)
    }
}

impl fmt::Display for SendingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SendingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMMEDIATE" => Ok(SendingType::Immediate),
            "RESERVATION" => Ok(SendingType::Reservation),
            "AUTOMATIC" => Ok(SendingType::Automatic),
            _ => Err(format!("Invalid sending type: {}", s)),
        }
    }
}

/// Editorial kind of a message. Advertising carries extra legal wording
/// upstream and is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    #[default]
    Announcement,
    Advertising,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Announcement => "ANNOUNCEMENT",
            MessageKind::Advertising => "ADVERTISING",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANNOUNCEMENT" => Ok(MessageKind::Announcement),
            "ADVERTISING" => Ok(MessageKind::Advertising),
            _ => Err(format!("Invalid message kind: {}", s)),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by message scheduling and state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("A scheduled time is required for reservation messages")]
    ScheduleTimeRequired,

    #[error("A scheduled time is not allowed for {0} messages")]
    ScheduleTimeNotAllowed(SendingType),

    #[error("Scheduled time must be in the future")]
    ScheduledTimeInPast,

    #[error("Only reservation messages can be edited or rescheduled")]
    NotReservation,

    #[error("Message is already {0}")]
    NotPending(MessageStatus),

    #[error("Reservation time has already passed")]
    AlreadyDue,

    #[error("Message {message_id} does not belong to shop {shop_id}")]
    ShopMismatch { message_id: i64, shop_id: i64 },

    #[error("Invalid message transition from {from} to {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },
}

impl MessageError {
    /// Errors caused by a scheduled time that does not match the sending type.
    pub fn is_schedule_mismatch(&self) -> bool {
        matches!(
            self,
            MessageError::ScheduleTimeRequired
                | MessageError::ScheduleTimeNotAllowed(_)
                | MessageError::ScheduledTimeInPast
        )
    }
}

/// Resolves the effective scheduled time of a new message.
///
/// Reservations must name a time strictly after `now`; every other sending
/// type is scheduled at `now` and must not name a time at all.
pub fn resolve_scheduled_at(
    sending_type: SendingType,
    requested: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, MessageError> {
    match (sending_type.is_reservation(), requested) {
        (true, Some(at)) if at > now => Ok(at),
        (true, Some(_)) => Err(MessageError::ScheduledTimeInPast),
        (true, None) => Err(MessageError::ScheduleTimeRequired),
        (false, None) => Ok(now),
        (false, Some(_)) => Err(MessageError::ScheduleTimeNotAllowed(sending_type)),
    }
}

/// Whether a body contains a link the click tracker should rewrite.
pub fn contains_link(content: &str) -> bool {
    content.contains("http://") || content.contains("https://")
}

// ============================================================================
// Core Model
// ============================================================================

/// A persisted outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub shop_id: i64,
    pub customer_id: i64,
    pub content: String,
    pub status: MessageStatus,
    pub sending_type: SendingType,
    pub kind: MessageKind,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    pub has_link: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_grade_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// A reservation can be edited or cancelled only while it is still
    /// waiting and its time has not come.
    pub fn is_reservable(&self, now: DateTime<Utc>) -> bool {
        self.sending_type.is_reservation()
            && self.status == MessageStatus::Pending
            && self.scheduled_at > now
    }

    pub fn belongs_to_shop(&self, shop_id: i64) -> bool {
        self.shop_id == shop_id
    }

    fn transition(&mut self, target: MessageStatus, now: DateTime<Utc>) -> Result<(), MessageError> {
        if !self.status.can_transition_to(target) {
            return Err(MessageError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING → SENT. Records the send time.
    pub fn mark_as_sent(&mut self, now: DateTime<Utc>) -> Result<(), MessageError> {
        self.transition(MessageStatus::Sent, now)?;
        self.sent_at = Some(now);
        Ok(())
    }

    /// PENDING → FAIL. `sent_at` stays unset.
    pub fn mark_as_failed(&mut self, now: DateTime<Utc>) -> Result<(), MessageError> {
        self.transition(MessageStatus::Fail, now)
    }

    fn ensure_editable(&self, now: DateTime<Utc>) -> Result<(), MessageError> {
        if !self.sending_type.is_reservation() {
            return Err(MessageError::NotReservation);
        }
        if self.status != MessageStatus::Pending {
            return Err(MessageError::NotPending(self.status));
        }
        if self.scheduled_at <= now {
            return Err(MessageError::AlreadyDue);
        }
        Ok(())
    }

    /// PENDING → CANCELLED for a reservation that is not yet due.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), MessageError> {
        self.ensure_editable(now)?;
        self.transition(MessageStatus::Cancelled, now)
    }

    /// Moves a pending reservation to a new future time.
    pub fn reschedule(
        &mut self,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), MessageError> {
        self.ensure_editable(now)?;
        if scheduled_at <= now {
            return Err(MessageError::ScheduledTimeInPast);
        }
        self.scheduled_at = scheduled_at;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the editable parts of a pending reservation.
    pub fn update_reservation(
        &mut self,
        update: &UpdateReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<(), MessageError> {
        self.reschedule(update.scheduled_at, now)?;
        self.content = update.content.clone();
        self.has_link = contains_link(&self.content);
        self.kind = update.message_kind;
        self.customer_id = update.customer_id;
        Ok(())
    }
}

/// A message that has been validated but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub shop_id: i64,
    pub customer_id: i64,
    pub content: String,
    pub sending_type: SendingType,
    pub kind: MessageKind,
    pub scheduled_at: DateTime<Utc>,
    pub has_link: bool,
    pub template_id: Option<i64>,
    pub coupon_id: Option<i64>,
    pub workflow_id: Option<i64>,
    pub customer_grade_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Materializes the row as it exists right after insert.
    pub fn into_message(self, id: i64) -> Message {
        Message {
            id,
            shop_id: self.shop_id,
            customer_id: self.customer_id,
            content: self.content,
            status: MessageStatus::Pending,
            sending_type: self.sending_type,
            kind: self.kind,
            scheduled_at: self.scheduled_at,
            sent_at: None,
            has_link: self.has_link,
            template_id: self.template_id,
            coupon_id: self.coupon_id,
            workflow_id: self.workflow_id,
            customer_grade_id: self.customer_grade_id,
            tag_id: self.tag_id,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Request payload for sending a message to one or more customers.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(custom(function = "shared::validation::validate_recipient_ids"))]
    pub customer_ids: Vec<i64>,

    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,

    #[serde(default)]
    pub message_kind: MessageKind,

    pub sending_type: SendingType,

    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub template_id: Option<i64>,

    #[serde(default)]
    pub coupon_id: Option<i64>,

    #[serde(default)]
    pub customer_grade_id: Option<i64>,

    #[serde(default)]
    pub tag_id: Option<i64>,

    /// Set internally when a workflow or automatic trigger originates the send.
    #[serde(default, skip_deserializing)]
    pub workflow_id: Option<i64>,
}

impl SendMessageRequest {
    /// Minimal request used by internal callers.
    pub fn new(customer_ids: Vec<i64>, content: impl Into<String>, sending_type: SendingType) -> Self {
        Self {
            customer_ids,
            content: content.into(),
            message_kind: MessageKind::default(),
            sending_type,
            scheduled_at: None,
            template_id: None,
            coupon_id: None,
            customer_grade_id: None,
            tag_id: None,
            workflow_id: None,
        }
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// Request payload for editing a pending reservation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReservationRequest {
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,

    #[serde(default)]
    pub message_kind: MessageKind,

    #[validate(range(min = 1, message = "customerId must be positive"))]
    pub customer_id: i64,

    pub scheduled_at: DateTime<Utc>,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Result of a send request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub messages: Vec<Message>,
    pub sent_count: usize,
    pub failed_count: usize,
    pub pending_count: usize,
    /// Messages whose gateway verdict is reported here but could not be
    /// written; their stored rows are still pending.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrecorded_ids: Vec<i64>,
}

impl SendMessageResponse {
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let count = |status| messages.iter().filter(|m| m.status == status).count();
        Self {
            sent_count: count(MessageStatus::Sent),
            failed_count: count(MessageStatus::Fail),
            pending_count: count(MessageStatus::Pending),
            messages,
            unrecorded_ids: Vec::new(),
        }
    }

    pub fn with_unrecorded(mut self, ids: Vec<i64>) -> Self {
        self.unrecorded_ids = ids;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(now: DateTime<Utc>) -> Message {
        NewMessage {
            shop_id: 1,
            customer_id: 10,
            content: "Hi".to_string(),
            sending_type: SendingType::Reservation,
            kind: MessageKind::Announcement,
            scheduled_at: now + Duration::hours(1),
            has_link: false,
            template_id: None,
            coupon_id: None,
            workflow_id: None,
            customer_grade_id: None,
            tag_id: None,
            created_at: now,
        }
        .into_message(7)
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Fail,
            MessageStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MessageStatus>().unwrap(), status);
        }
        assert!("DELIVERED".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn test_only_pending_transitions_out() {
        use MessageStatus::*;
        for target in [Sent, Fail, Cancelled] {
            assert!(Pending.can_transition_to(target));
            for terminal in [Sent, Fail, Cancelled] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_resolve_scheduled_at_reservation_needs_future_time() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);

        assert_eq!(
            resolve_scheduled_at(SendingType::Reservation, Some(later), now),
            Ok(later)
        );
        assert_eq!(
            resolve_scheduled_at(SendingType::Reservation, None, now),
            Err(MessageError::ScheduleTimeRequired)
        );
        assert_eq!(
            resolve_scheduled_at(SendingType::Reservation, Some(now), now),
            Err(MessageError::ScheduledTimeInPast)
        );
    }

    #[test]
    fn test_resolve_scheduled_at_immediate_rejects_time() {
        let now = Utc::now();

        assert_eq!(resolve_scheduled_at(SendingType::Immediate, None, now), Ok(now));
        assert_eq!(resolve_scheduled_at(SendingType::Automatic, None, now), Ok(now));
        let err = resolve_scheduled_at(SendingType::Immediate, Some(now), now).unwrap_err();
        assert_eq!(err, MessageError::ScheduleTimeNotAllowed(SendingType::Immediate));
        assert!(err.is_schedule_mismatch());
    }

    #[test]
    fn test_mark_as_sent_sets_sent_at_once() {
        let now = Utc::now();
        let mut message = reservation(now);

        message.mark_as_sent(now).unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.sent_at, Some(now));

        let later = now + Duration::minutes(1);
        assert!(message.mark_as_sent(later).is_err());
        assert!(message.mark_as_failed(later).is_err());
        assert_eq!(message.sent_at, Some(now));
    }

    #[test]
    fn test_mark_as_failed_leaves_sent_at_unset() {
        let now = Utc::now();
        let mut message = reservation(now);

        message.mark_as_failed(now).unwrap();
        assert_eq!(message.status, MessageStatus::Fail);
        assert!(message.sent_at.is_none());
        assert!(message.cancel(now).is_err());
    }

    #[test]
    fn test_cancel_requires_future_pending_reservation() {
        let now = Utc::now();

        let mut message = reservation(now);
        message.cancel(now).unwrap();
        assert_eq!(message.status, MessageStatus::Cancelled);
        assert_eq!(
            message.cancel(now),
            Err(MessageError::NotPending(MessageStatus::Cancelled))
        );

        let mut due = reservation(now);
        assert_eq!(due.cancel(now + Duration::hours(2)), Err(MessageError::AlreadyDue));

        let mut immediate = reservation(now);
        immediate.sending_type = SendingType::Immediate;
        assert_eq!(immediate.cancel(now), Err(MessageError::NotReservation));
    }

    #[test]
    fn test_update_reservation_replaces_fields() {
        let now = Utc::now();
        let mut message = reservation(now);
        let update = UpdateReservationRequest {
            content: "Visit https://example.com".to_string(),
            message_kind: MessageKind::Advertising,
            customer_id: 11,
            scheduled_at: now + Duration::days(1),
        };

        message.update_reservation(&update, now).unwrap();
        assert_eq!(message.customer_id, 11);
        assert_eq!(message.kind, MessageKind::Advertising);
        assert!(message.has_link);
        assert_eq!(message.scheduled_at, now + Duration::days(1));
    }

    #[test]
    fn test_update_reservation_rejects_past_time() {
        let now = Utc::now();
        let mut message = reservation(now);
        let original = message.clone();
        let update = UpdateReservationRequest {
            content: "x".to_string(),
            message_kind: MessageKind::Announcement,
            customer_id: 10,
            scheduled_at: now - Duration::minutes(1),
        };

        assert_eq!(
            message.update_reservation(&update, now),
            Err(MessageError::ScheduledTimeInPast)
        );
        assert_eq!(message, original);
    }

    #[test]
    fn test_send_request_validation() {
        let request = SendMessageRequest::new(vec![1, 2], "Hello", SendingType::Immediate);
        assert!(request.validate().is_ok());

        let empty = SendMessageRequest::new(vec![], "Hello", SendingType::Immediate);
        assert!(empty.validate().is_err());

        let blank = SendMessageRequest::new(vec![1], "", SendingType::Immediate);
        assert!(blank.validate().is_err());

        let long = SendMessageRequest::new(vec![1], "a".repeat(501), SendingType::Immediate);
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_send_request_ignores_workflow_id_from_wire() {
        let json = r#"{"customerIds":[1],"content":"Hi","sendingType":"IMMEDIATE","workflowId":9}"#;
        let request: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert!(request.workflow_id.is_none());
        assert_eq!(request.message_kind, MessageKind::Announcement);
    }

    #[test]
    fn test_send_response_counts() {
        let now = Utc::now();
        let mut sent = reservation(now);
        sent.mark_as_sent(now).unwrap();
        let pending = reservation(now);

        let response = SendMessageResponse::from_messages(vec![sent, pending]);
        assert_eq!(response.sent_count, 1);
        assert_eq!(response.pending_count, 1);
        assert_eq!(response.failed_count, 0);
    }
}
