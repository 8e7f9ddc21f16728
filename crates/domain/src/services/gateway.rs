//! Outbound SMS gateway abstraction.
//!
//! The gateway bills and rate-limits per call, so callers batch recipients
//! that share a sender and body into a single `send_many`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Infrastructure failures of a gateway call as a whole.
///
/// Per-recipient rejections are reported through [`SendOutcome`] instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway credentials are missing or invalid")]
    Credentials,

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// One recipient of a batched send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendUnit {
    pub message_id: i64,
    pub address: String,
}

/// Gateway verdict for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub message_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SendOutcome {
    pub fn delivered(message_id: i64) -> Self {
        Self {
            message_id,
            success: true,
            reason: None,
        }
    }

    pub fn rejected(message_id: i64, reason: impl Into<String>) -> Self {
        Self {
            message_id,
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// The remote service that actually transmits messages.
#[async_trait::async_trait]
pub trait SmsGateway: Send + Sync {
    /// Sends one body to one address.
    async fn send_one(&self, sender: &str, to: &str, body: &str) -> Result<(), GatewayError>;

    /// Sends one body to many addresses in a single call.
    async fn send_many(
        &self,
        sender: &str,
        body: &str,
        recipients: &[SendUnit],
    ) -> Result<Vec<SendOutcome>, GatewayError>;
}

/// A call observed by [`MockSmsGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub sender: String,
    pub body: String,
    pub addresses: Vec<String>,
}

/// In-process gateway for development and tests.
///
/// Logs every call and records it for inspection. It can fail whole calls,
/// reject specific addresses, or leave addresses out of batched results.
#[derive(Debug, Clone, Default)]
pub struct MockSmsGateway {
    /// Whether every call fails with [`GatewayError::Unavailable`].
    pub simulate_failure: bool,
    rejected_addresses: Arc<Mutex<HashSet<String>>>,
    omitted_addresses: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<GatewayCall>>>,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock gateway whose calls all fail.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Report failure for this address from now on.
    pub fn reject_address(&self, address: impl Into<String>) {
        if let Ok(mut rejected) = self.rejected_addresses.lock() {
            rejected.insert(address.into());
        }
    }

    /// Answer batched sends without a verdict for this address.
    pub fn omit_address(&self, address: impl Into<String>) {
        if let Ok(mut omitted) = self.omitted_addresses.lock() {
            omitted.insert(address.into());
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn record(&self, sender: &str, body: &str, addresses: Vec<String>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(GatewayCall {
                sender: sender.to_string(),
                body: body.to_string(),
                addresses,
            });
        }
    }

    fn is_omitted(&self, address: &str) -> bool {
        self.omitted_addresses
            .lock()
            .map(|o| o.contains(address))
            .unwrap_or(false)
    }

    fn is_rejected(&self, address: &str) -> bool {
        self.rejected_addresses
            .lock()
            .map(|r| r.contains(address))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl SmsGateway for MockSmsGateway {
    async fn send_one(&self, sender: &str, to: &str, body: &str) -> Result<(), GatewayError> {
        self.record(sender, body, vec![to.to_string()]);

        if self.simulate_failure {
            tracing::warn!(sender = %sender, "Mock gateway simulating failure");
            return Err(GatewayError::Unavailable("Simulated failure".to_string()));
        }
        if self.is_rejected(to) {
            return Err(GatewayError::Rejected(format!("Address {} rejected", to)));
        }

        tracing::info!(sender = %sender, body_len = body.len(), "Mock: Would send message");
        Ok(())
    }

    async fn send_many(
        &self,
        sender: &str,
        body: &str,
        recipients: &[SendUnit],
    ) -> Result<Vec<SendOutcome>, GatewayError> {
        self.record(
            sender,
            body,
            recipients.iter().map(|r| r.address.clone()).collect(),
        );

        if self.simulate_failure {
            tracing::warn!(
                sender = %sender,
                recipients = recipients.len(),
                "Mock gateway simulating failure"
            );
            return Err(GatewayError::Unavailable("Simulated failure".to_string()));
        }

        tracing::info!(
            sender = %sender,
            recipients = recipients.len(),
            "Mock: Would send batched message"
        );

        Ok(recipients
            .iter()
            .filter(|unit| !self.is_omitted(&unit.address))
            .map(|unit| {
                if self.is_rejected(&unit.address) {
                    SendOutcome::rejected(unit.message_id, "Address rejected")
                } else {
                    SendOutcome::delivered(unit.message_id)
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> Vec<SendUnit> {
        vec![
            SendUnit {
                message_id: 1,
                address: "010-0000-0001".to_string(),
            },
            SendUnit {
                message_id: 2,
                address: "010-0000-0002".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_mock_records_batched_call() {
        let gateway = MockSmsGateway::new();
        let outcomes = gateway.send_many("SHOP1", "Hi", &units()).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.success));
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(gateway.calls()[0].addresses.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_rejects_selected_address() {
        let gateway = MockSmsGateway::new();
        gateway.reject_address("010-0000-0002");

        let outcomes = gateway.send_many("SHOP1", "Hi", &units()).await.unwrap();
        assert_eq!(outcomes[0], SendOutcome::delivered(1));
        assert!(!outcomes[1].success);

        assert!(gateway.send_one("SHOP1", "010-0000-0002", "Hi").await.is_err());
        assert!(gateway.send_one("SHOP1", "010-0000-0001", "Hi").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_omits_selected_address() {
        let gateway = MockSmsGateway::new();
        gateway.omit_address("010-0000-0001");

        let outcomes = gateway.send_many("SHOP1", "Hi", &units()).await.unwrap();
        assert_eq!(outcomes, vec![SendOutcome::delivered(2)]);
        assert_eq!(gateway.calls()[0].addresses.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_mock_still_records() {
        let gateway = MockSmsGateway::failing();
        let result = gateway.send_many("SHOP1", "Hi", &units()).await;

        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert_eq!(gateway.call_count(), 1);
    }
}
