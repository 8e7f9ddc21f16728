//! Scheduled-message dispatch job.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::scheduler::Job;
use crate::services::MessageDispatcher;

pub struct MessageDispatchJob {
    dispatcher: Arc<MessageDispatcher>,
    delay: Duration,
}

impl MessageDispatchJob {
    pub fn new(dispatcher: Arc<MessageDispatcher>, interval_secs: u64) -> Self {
        Self {
            dispatcher,
            delay: Duration::from_secs(interval_secs),
        }
    }
}

#[async_trait::async_trait]
impl Job for MessageDispatchJob {
    fn name(&self) -> &'static str {
        "message_dispatch"
    }

    fn delay(&self) -> Duration {
        self.delay
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self.dispatcher.run_pass().await.map_err(|e| e.to_string())?;
        if report.unresolved > 0 {
            info!(unresolved = report.unresolved, "Due messages without a resolvable recipient");
        }
        Ok(())
    }
}
