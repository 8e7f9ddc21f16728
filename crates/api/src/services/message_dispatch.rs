//! Batched dispatch of due reservations.
//!
//! One pass loads every pending reservation whose time has come, groups the
//! messages by (sender, body) and makes one gateway call per group.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::Message;
use domain::services::{RecipientDirectory, SendUnit, SmsGateway};
use domain::stores::{MessageSettingsStore, MessageStore};
use domain::DomainResult;
use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

use super::Dependencies;

/// Summary of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Due reservations found.
    pub due: usize,
    /// Messages skipped because their recipient has no address.
    pub unresolved: usize,
    /// Gateway calls made.
    pub groups: usize,
    pub sent: u64,
    pub failed: u64,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.due == 0
    }
}

#[derive(Default)]
struct DueBatch {
    due: usize,
    unresolved: usize,
    resolved: Vec<(Message, String)>,
}

struct Recipient {
    message_id: i64,
    shop_id: i64,
    address: String,
}

pub struct MessageDispatcher {
    messages: Arc<dyn MessageStore>,
    settings: Arc<dyn MessageSettingsStore>,
    recipients: Arc<dyn RecipientDirectory>,
    gateway: Arc<dyn SmsGateway>,
    batch_size: i64,
}

impl MessageDispatcher {
    pub fn new(deps: &Dependencies, batch_size: i64) -> Self {
        Self {
            messages: deps.messages.clone(),
            settings: deps.settings.clone(),
            recipients: deps.recipients.clone(),
            gateway: deps.gateway.clone(),
            batch_size,
        }
    }

    pub async fn run_pass(&self) -> DomainResult<DispatchReport> {
        self.run_pass_at(Utc::now()).await
    }

    /// Dispatches everything due at `now`.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> DomainResult<DispatchReport> {
        let batch = self.collect_due(now).await?;
        let mut report = DispatchReport {
            due: batch.due,
            unresolved: batch.unresolved,
            ..Default::default()
        };
        if batch.resolved.is_empty() {
            if report.unresolved > 0 {
                info!(
                    due = report.due,
                    unresolved = report.unresolved,
                    "Dispatch pass found no deliverable messages"
                );
            }
            return Ok(report);
        }

        let resolved: Vec<&Message> = batch.resolved.iter().map(|(m, _)| m).collect();
        let senders = self.senders_for(&resolved).await?;

        let mut groups: BTreeMap<(String, String), Vec<Recipient>> = BTreeMap::new();
        let mut failed_ids = Vec::new();
        for (message, address) in &batch.resolved {
            match senders.get(&message.shop_id) {
                Some(sender) => groups
                    .entry((sender.clone(), message.content.clone()))
                    .or_default()
                    .push(Recipient {
                        message_id: message.id,
                        shop_id: message.shop_id,
                        address: address.clone(),
                    }),
                None => failed_ids.push(message.id),
            }
        }

        let mut sent_ids = Vec::new();
        report.groups = groups.len();
        for ((sender, body), recipients) in &groups {
            let (sent, failed) = self.send_group(sender, body, recipients).await;
            sent_ids.extend(sent);
            failed_ids.extend(failed);
        }

        report.sent = self.messages.mark_sent(&sent_ids, now).await?;
        report.failed = self.messages.mark_failed(&failed_ids, now).await?;

        counter!("dispatch_groups_total").increment(report.groups as u64);
        counter!("messages_dispatched_total", "outcome" => "sent").increment(report.sent);
        counter!("messages_dispatched_total", "outcome" => "failed").increment(report.failed);

        info!(
            due = report.due,
            unresolved = report.unresolved,
            groups = report.groups,
            sent = report.sent,
            failed = report.failed,
            "Dispatch pass completed"
        );
        Ok(report)
    }

    /// Reads due reservations page by page until `batch_size` of them have a
    /// resolvable recipient or the due set runs out. Unresolved rows stay
    /// pending and are paged past, so they never hide deliverable ones.
    async fn collect_due(&self, now: DateTime<Utc>) -> DomainResult<DueBatch> {
        let mut batch = DueBatch::default();
        let mut after = None;

        loop {
            let page = self
                .messages
                .find_due_reservations(now, after, self.batch_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some((last.scheduled_at, last.id));
            let exhausted = (page.len() as i64) < self.batch_size;
            batch.due += page.len();

            let customer_ids: Vec<i64> = page
                .iter()
                .map(|m| m.customer_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let addresses = self.recipients.resolve_addresses(&customer_ids).await?;

            for message in page {
                match addresses.get(&message.customer_id) {
                    Some(address) => {
                        let address = address.clone();
                        batch.resolved.push((message, address));
                    }
                    None => {
                        // Left pending; there is no dead-letter for these yet.
                        warn!(
                            message_id = message.id,
                            shop_id = message.shop_id,
                            customer_id = message.customer_id,
                            "Recipient address not found, message left pending"
                        );
                        batch.unresolved += 1;
                    }
                }
            }

            if exhausted || batch.resolved.len() as i64 >= self.batch_size {
                break;
            }
        }
        Ok(batch)
    }

    /// Sender identity per shop. Shops without one are logged and absent.
    async fn senders_for(&self, messages: &[&Message]) -> DomainResult<HashMap<i64, String>> {
        let shop_ids: BTreeSet<i64> = messages.iter().map(|m| m.shop_id).collect();
        let mut senders = HashMap::with_capacity(shop_ids.len());

        for shop_id in shop_ids {
            let sender = self
                .settings
                .find_by_shop(shop_id)
                .await?
                .and_then(|s| s.sender().map(str::to_string));
            match sender {
                Some(sender) => {
                    senders.insert(shop_id, sender);
                }
                None => {
                    let count = messages.iter().filter(|m| m.shop_id == shop_id).count();
                    error!(
                        shop_id = shop_id,
                        messages = count,
                        "Shop has no sender identity, failing its due messages"
                    );
                }
            }
        }
        Ok(senders)
    }

    /// Returns (sent, failed) message ids for one gateway call.
    async fn send_group(
        &self,
        sender: &str,
        body: &str,
        recipients: &[Recipient],
    ) -> (Vec<i64>, Vec<i64>) {
        let units: Vec<SendUnit> = recipients
            .iter()
            .map(|r| SendUnit {
                message_id: r.message_id,
                address: r.address.clone(),
            })
            .collect();

        match self.gateway.send_many(sender, body, &units).await {
            Ok(outcomes) => {
                let delivered: HashSet<i64> = outcomes
                    .iter()
                    .filter(|o| o.success)
                    .map(|o| o.message_id)
                    .collect();
                // Ids the gateway did not answer for count as failed.
                recipients
                    .iter()
                    .map(|r| r.message_id)
                    .partition(|id| delivered.contains(id))
            }
            Err(e) => {
                let shop_ids: BTreeSet<i64> = recipients.iter().map(|r| r.shop_id).collect();
                error!(
                    shop_ids = ?shop_ids,
                    sender = %sender,
                    group_size = recipients.len(),
                    error = %e,
                    "Gateway call failed, failing the whole group"
                );
                (Vec::new(), recipients.iter().map(|r| r.message_id).collect())
            }
        }
    }
}
