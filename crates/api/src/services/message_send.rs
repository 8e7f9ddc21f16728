//! Message send, cancel and reservation editing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::message::{
    contains_link, resolve_scheduled_at, SendMessageRequest, SendMessageResponse,
    UpdateReservationRequest,
};
use domain::models::{Message, MessageError, NewMessage};
use domain::services::{
    substitute_variables, RecipientDirectory, ShopDirectory, SmsGateway, VariableResolver,
};
use domain::stores::{MessageSettingsStore, MessageStore};
use domain::{DomainError, DomainResult};
use shared::pagination::{Page, PageCursor, PageRequest};
use tracing::{error, info, warn};
use validator::Validate;

use super::Dependencies;

pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    settings: Arc<dyn MessageSettingsStore>,
    shops: Arc<dyn ShopDirectory>,
    recipients: Arc<dyn RecipientDirectory>,
    variables: Arc<dyn VariableResolver>,
    gateway: Arc<dyn SmsGateway>,
}

impl MessageService {
    pub fn new(deps: &Dependencies) -> Self {
        Self {
            messages: deps.messages.clone(),
            settings: deps.settings.clone(),
            shops: deps.shops.clone(),
            recipients: deps.recipients.clone(),
            variables: deps.variables.clone(),
            gateway: deps.gateway.clone(),
        }
    }

    /// Persists one message per recipient and, unless the send is a
    /// reservation, hands each one to the gateway right away.
    pub async fn send(
        &self,
        shop_id: i64,
        request: SendMessageRequest,
    ) -> DomainResult<SendMessageResponse> {
        self.send_at(shop_id, request, Utc::now()).await
    }

    pub async fn send_at(
        &self,
        shop_id: i64,
        request: SendMessageRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<SendMessageResponse> {
        request.validate()?;
        let scheduled_at = resolve_scheduled_at(request.sending_type, request.scheduled_at, now)?;

        if !self.shops.exists(shop_id).await? {
            return Err(DomainError::not_found("Shop", shop_id));
        }
        let settings = self
            .settings
            .find_by_shop(shop_id)
            .await?
            .ok_or_else(|| DomainError::not_found("MessageSettings", shop_id))?;

        // Reservations pick up the sender at dispatch time.
        let sender = if request.sending_type.is_reservation() {
            None
        } else {
            Some(
                settings
                    .sender()
                    .map(str::to_string)
                    .ok_or_else(|| DomainError::not_found("SenderIdentity", shop_id))?,
            )
        };

        let mut seen = HashSet::new();
        let customer_ids: Vec<i64> = request
            .customer_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let addresses = self.recipients.resolve_addresses(&customer_ids).await?;
        let missing: Vec<String> = customer_ids
            .iter()
            .filter(|id| !addresses.contains_key(id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::not_found("Customer", missing.join(", ")));
        }

        let mut rows = Vec::with_capacity(customer_ids.len());
        for customer_id in &customer_ids {
            let payload = self.variables.payload(shop_id, *customer_id).await?;
            let content = substitute_variables(&request.content, &payload);
            rows.push(NewMessage {
                shop_id,
                customer_id: *customer_id,
                has_link: contains_link(&content),
                content,
                sending_type: request.sending_type,
                kind: request.message_kind,
                scheduled_at,
                template_id: request.template_id,
                coupon_id: request.coupon_id,
                workflow_id: request.workflow_id,
                customer_grade_id: request.customer_grade_id,
                tag_id: request.tag_id,
                created_at: now,
            });
        }

        let mut inserted = self.messages.insert_batch(rows).await?;
        info!(
            shop_id = shop_id,
            count = inserted.len(),
            sending_type = %request.sending_type,
            "Messages created"
        );

        // Past this point the rows exist and may already be on the wire, so
        // per-row problems are reported in the response, never as an error.
        let mut unrecorded = Vec::new();
        if let Some(sender) = sender {
            for message in &mut inserted {
                let Some(address) = addresses.get(&message.customer_id) else {
                    continue;
                };
                if !self.deliver(&sender, address, message, now).await {
                    unrecorded.push(message.id);
                }
            }
        }

        Ok(SendMessageResponse::from_messages(inserted).with_unrecorded(unrecorded))
    }

    /// Sends one persisted message and records the outcome in its own write.
    ///
    /// `message` always ends up carrying the gateway verdict. Returns false
    /// when that verdict could not be written, leaving the stored row pending.
    async fn deliver(
        &self,
        sender: &str,
        address: &str,
        message: &mut Message,
        now: DateTime<Utc>,
    ) -> bool {
        let delivered = match self.gateway.send_one(sender, address, &message.content).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    shop_id = message.shop_id,
                    message_id = message.id,
                    error = %e,
                    "Immediate send failed"
                );
                false
            }
        };

        let (outcome, written, transition) = if delivered {
            (
                "sent",
                self.messages.mark_sent(&[message.id], now).await,
                message.mark_as_sent(now),
            )
        } else {
            (
                "failed",
                self.messages.mark_failed(&[message.id], now).await,
                message.mark_as_failed(now),
            )
        };
        metrics::counter!("messages_dispatched_total", "outcome" => outcome).increment(1);

        if let Err(e) = transition {
            warn!(message_id = message.id, error = %e, "Message was not pending after insert");
        }
        match written {
            Ok(_) => true,
            Err(e) => {
                error!(
                    shop_id = message.shop_id,
                    message_id = message.id,
                    outcome = outcome,
                    error = %e,
                    "Delivery outcome not recorded, message left pending"
                );
                false
            }
        }
    }

    pub async fn get(&self, shop_id: i64, message_id: i64) -> DomainResult<Message> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Message", message_id))?;

        if !message.belongs_to_shop(shop_id) {
            return Err(MessageError::ShopMismatch {
                message_id,
                shop_id,
            }
            .into());
        }
        Ok(message)
    }

    pub async fn list(&self, shop_id: i64, page: PageRequest) -> DomainResult<Page<Message>> {
        let rows = self.messages.list_for_shop(shop_id, &page).await?;
        Ok(Page::from_rows(rows, &page, |m| {
            PageCursor::new(m.created_at, m.id)
        }))
    }

    /// Cancels a reservation that has not been dispatched yet.
    pub async fn cancel(&self, shop_id: i64, message_id: i64) -> DomainResult<Message> {
        let now = Utc::now();
        let mut message = self.get(shop_id, message_id).await?;
        message.cancel(now)?;
        self.save(&message).await?;

        info!(shop_id = shop_id, message_id = message_id, "Reservation cancelled");
        Ok(message)
    }

    pub async fn update_reservation(
        &self,
        shop_id: i64,
        message_id: i64,
        request: UpdateReservationRequest,
    ) -> DomainResult<Message> {
        request.validate()?;
        let now = Utc::now();
        let mut message = self.get(shop_id, message_id).await?;

        if request.customer_id != message.customer_id
            && self
                .recipients
                .resolve_address(request.customer_id)
                .await?
                .is_none()
        {
            return Err(DomainError::not_found("Customer", request.customer_id));
        }

        message.update_reservation(&request, now)?;
        let payload = self.variables.payload(shop_id, message.customer_id).await?;
        message.content = substitute_variables(&message.content, &payload);
        message.has_link = contains_link(&message.content);
        self.save(&message).await?;

        info!(shop_id = shop_id, message_id = message_id, "Reservation updated");
        Ok(message)
    }

    async fn save(&self, message: &Message) -> DomainResult<()> {
        if self.messages.save_pending(message).await? {
            Ok(())
        } else {
            // The dispatcher got there first.
            Err(DomainError::Conflict(format!(
                "Message {} is no longer pending",
                message.id
            )))
        }
    }
}
