//! Chain-facing data types shared by the indexer and the scheduler

use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

/// Entry returned when listing signatures for the program address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Whether the transaction failed on-chain
    pub failed: bool,
}

/// Status metadata of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    pub err: Option<Value>,
    pub log_messages: Option<Vec<String>>,
}

/// A confirmed transaction as fetched from the RPC node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub meta: Option<TransactionMeta>,
    /// Full RPC representation, forwarded verbatim in transaction summaries
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyStatus {
    Active,
    Paused,
    Cancelled,
    Completed,
    Unknown(String),
}

impl PolicyStatus {
    pub fn from_variant(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "active" => PolicyStatus::Active,
            "paused" => PolicyStatus::Paused,
            "cancelled" | "canceled" => PolicyStatus::Cancelled,
            "completed" => PolicyStatus::Completed,
            _ => PolicyStatus::Unknown(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyType {
    Subscription { max_renewals: Option<u64> },
    Other(String),
}

/// Payment policy account owned by the recurring-payments program.
///
/// Only the fields the scheduler reasons about are lifted out; the full
/// decoded account stays in `fields` for instruction resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPolicy {
    pub address: Pubkey,
    pub policy_id: u64,
    pub status: PolicyStatus,
    pub next_payment_due: i64,
    pub policy_type: PolicyType,
    pub payment_count: u64,
    pub fields: Value,
}
