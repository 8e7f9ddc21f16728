//! Event-driven automatic messages.
//!
//! A shop registers at most one message per event type; `fire` is called by
//! the rest of the CRM when the event happens for a customer.

use std::sync::Arc;

use chrono::Utc;
use domain::models::automatic_message::{
    RegisterAutomaticMessageRequest, UpdateAutomaticMessageRequest,
};
use domain::models::message::{SendMessageRequest, SendMessageResponse};
use domain::models::{AutomaticEventType, AutomaticMessage, SendingType};
use domain::stores::{AutomaticMessageStore, StoreError};
use domain::{DomainError, DomainResult};
use tracing::{debug, info};
use validator::Validate;

use super::{Dependencies, MessageService};

pub struct AutomaticMessageService {
    store: Arc<dyn AutomaticMessageStore>,
    messages: Arc<MessageService>,
}

impl AutomaticMessageService {
    pub fn new(deps: &Dependencies, messages: Arc<MessageService>) -> Self {
        Self {
            store: deps.automatic_messages.clone(),
            messages,
        }
    }

    pub async fn register(
        &self,
        shop_id: i64,
        request: RegisterAutomaticMessageRequest,
    ) -> DomainResult<AutomaticMessage> {
        request.validate()?;
        let event_type = request.event_type;
        let message = AutomaticMessage::new(shop_id, request, Utc::now());

        let created = self.store.create(&message).await.map_err(|e| match e {
            StoreError::Duplicate(_) => DomainError::Conflict(format!(
                "Automatic message for {} already registered",
                event_type.as_str()
            )),
            other => other.into(),
        })?;

        info!(
            shop_id = shop_id,
            automatic_message_id = created.id,
            event_type = event_type.as_str(),
            "Automatic message registered"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        shop_id: i64,
        id: i64,
        request: UpdateAutomaticMessageRequest,
    ) -> DomainResult<AutomaticMessage> {
        request.validate()?;
        let mut message = self
            .store
            .find_by_id(id)
            .await?
            .filter(|m| m.shop_id == shop_id)
            .ok_or_else(|| DomainError::not_found("AutomaticMessage", id))?;

        message.update(request, Utc::now());
        Ok(self.store.update(&message).await?)
    }

    pub async fn list(&self, shop_id: i64) -> DomainResult<Vec<AutomaticMessage>> {
        Ok(self.store.list_for_shop(shop_id).await?)
    }

    /// Sends the registered message for `event_type` to one customer.
    ///
    /// Returns `None` when the shop has no active registration for the event.
    pub async fn fire(
        &self,
        shop_id: i64,
        customer_id: i64,
        event_type: AutomaticEventType,
    ) -> DomainResult<Option<SendMessageResponse>> {
        let registration = match self.store.find_by_event(shop_id, event_type).await? {
            Some(r) if r.is_active => r,
            _ => {
                debug!(
                    shop_id = shop_id,
                    event_type = event_type.as_str(),
                    "No active automatic message, skipping"
                );
                return Ok(None);
            }
        };

        let mut request =
            SendMessageRequest::new(vec![customer_id], registration.content, SendingType::Automatic);
        request.template_id = Some(registration.id);
        request.workflow_id = registration.workflow_id;

        let response = self.messages.send(shop_id, request).await?;
        info!(
            shop_id = shop_id,
            customer_id = customer_id,
            event_type = event_type.as_str(),
            sent = response.sent_count,
            "Automatic message fired"
        );
        Ok(Some(response))
    }
}
