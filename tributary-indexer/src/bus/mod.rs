//! Message bus producers and topic routing

pub mod memory;
pub mod rest_proxy;

pub use self::memory::MemoryBus;
pub use self::rest_proxy::RestProxyBus;

use crate::core::{DecodedTransaction, EventBus};
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of publishing one transaction's messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub sent: usize,
    pub failed: usize,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Routes decoded transactions to `{prefix}_transactions` and `{prefix}_{EventName}`.
pub struct TopicPublisher {
    bus: Arc<dyn EventBus>,
    prefix: String,
}

impl TopicPublisher {
    pub fn new(bus: Arc<dyn EventBus>, prefix: impl Into<String>) -> Self {
        Self {
            bus,
            prefix: prefix.into(),
        }
    }

    pub fn transactions_topic(&self) -> String {
        format!("{}_transactions", self.prefix)
    }

    pub fn event_topic(&self, event_name: &str) -> String {
        format!("{}_{}", self.prefix, event_name)
    }

    /// The transactions topic followed by one topic per declared event.
    pub fn all_topics(&self, event_names: &[String]) -> Vec<String> {
        std::iter::once(self.transactions_topic())
            .chain(event_names.iter().map(|name| self.event_topic(name)))
            .collect()
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Send the summary, then each event in log order. A failed send is
    /// logged and the remaining messages are still attempted.
    pub async fn publish(&self, tx: &DecodedTransaction) -> PublishReport {
        let mut report = PublishReport::default();

        let summary_topic = self.transactions_topic();
        match serde_json::to_value(tx.summary()) {
            Ok(payload) => self.send_one(&summary_topic, &payload, &tx.signature, &mut report).await,
            Err(e) => {
                error!(signature = %tx.signature, error = %e, "Failed to serialize transaction summary");
                report.failed += 1;
            }
        }

        for message in tx.event_messages() {
            let topic = self.event_topic(&message.event_name);
            match serde_json::to_value(&message) {
                Ok(payload) => self.send_one(&topic, &payload, &tx.signature, &mut report).await,
                Err(e) => {
                    error!(signature = %tx.signature, error = %e, "Failed to serialize event message");
                    report.failed += 1;
                }
            }
        }

        debug!(signature = %tx.signature, sent = report.sent, failed = report.failed, "Published transaction");
        report
    }

    async fn send_one(&self, topic: &str, payload: &serde_json::Value, signature: &str, report: &mut PublishReport) {
        match self.bus.send(topic, payload).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                error!(topic = %topic, signature = %signature, error = %e, "Failed to publish message");
                report.failed += 1;
            }
        }
    }
}
