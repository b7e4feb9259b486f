//! Data carried between pipeline stages

use crate::decoder::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dedup record stored per processed signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signature: String,
    /// Unix milliseconds
    pub processed_at: i64,
}

/// Last processed position of a stream. An operator hint, not a correctness mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_signature: String,
    /// Unix milliseconds at write time
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub name: String,
    pub data: Value,
    /// Position within this transaction's own event list
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedTransaction {
    pub signature: String,
    pub slot: u64,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
    pub events: Vec<DecodedEvent>,
    pub transaction: Value,
}

/// Payload published to `{prefix}_transactions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub signature: String,
    pub slot: u64,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
    pub transaction: Value,
}

/// Payload published to `{prefix}_{eventName}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub index: usize,
    pub event_name: String,
    pub event_data: Value,
    pub signature: String,
    pub slot: u64,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
}

impl DecodedTransaction {
    pub fn summary(&self) -> TransactionMessage {
        TransactionMessage {
            signature: self.signature.clone(),
            slot: self.slot,
            block_time: self.block_time,
            transaction: self.transaction.clone(),
        }
    }

    pub fn event_messages(&self) -> impl Iterator<Item = EventMessage> + '_ {
        self.events.iter().map(move |event| EventMessage {
            index: event.index,
            event_name: event.name.clone(),
            event_data: event.data.clone(),
            signature: self.signature.clone(),
            slot: self.slot,
            block_time: self.block_time,
        })
    }
}

/// Result of running one signature through fetch -> decode -> publish
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Dedup store already holds the signature
    AlreadyProcessed,
    /// Every message was sent
    Published { events: usize },
    /// At least one message could not be sent
    PublishFailed { failed: usize },
    /// The transaction produced nothing to publish
    Rejected(DecodeError),
}

impl ProcessOutcome {
    /// Whether the signature should now be recorded as processed.
    ///
    /// Failed or log-less transactions will never yield events, so they are
    /// recorded. Unknown transactions and partial publishes stay eligible so a
    /// later pass can retry them.
    pub fn should_mark(&self) -> bool {
        match self {
            ProcessOutcome::Published { .. } => true,
            ProcessOutcome::Rejected(DecodeError::FailedOnChain(_) | DecodeError::NoLogs) => true,
            ProcessOutcome::Rejected(DecodeError::NotFound)
            | ProcessOutcome::PublishFailed { .. }
            | ProcessOutcome::AlreadyProcessed => false,
        }
    }
}
