//! Shared test doubles for the indexer integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tributary_chain::{
    ChainClient, ChainError, ChainResult, ConfirmedTransaction, EventSchema, PaymentPolicy, RawEvent,
    SignatureInfo, TransactionMeta,
};
use tributary_indexer::{MemoryBus, MemoryStore, ProgressTracker, TopicPublisher, TransactionProcessor, WATCHER_COMPONENT};

pub const PREFIX: &str = "tributary";

/// Chain with scripted history and per-signature failure injection.
pub struct MockChain {
    program_id: Pubkey,
    history: Mutex<Vec<SignatureInfo>>,
    transactions: Mutex<HashMap<String, ConfirmedTransaction>>,
    rate_limited: Mutex<HashMap<String, u32>>,
    broken: Mutex<HashMap<String, String>>,
    fetches: Mutex<Vec<String>>,
    listing_fails: AtomicBool,
}

impl MockChain {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            history: Mutex::new(Vec::new()),
            transactions: Mutex::new(HashMap::new()),
            rate_limited: Mutex::new(HashMap::new()),
            broken: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
            listing_fails: AtomicBool::new(false),
        }
    }

    /// Append a transaction as the newest entry in the program's history.
    pub fn push(&self, tx: ConfirmedTransaction) {
        self.history.lock().unwrap().insert(
            0,
            SignatureInfo {
                signature: tx.signature.clone(),
                slot: tx.slot,
                block_time: tx.block_time,
                failed: tx.meta.as_ref().is_some_and(|m| m.err.is_some()),
            },
        );
        self.transactions.lock().unwrap().insert(tx.signature.clone(), tx);
    }

    /// List a signature whose transaction the node cannot return.
    pub fn push_missing(&self, signature: &str, slot: u64) {
        self.history.lock().unwrap().insert(
            0,
            SignatureInfo { signature: signature.to_string(), slot, block_time: None, failed: false },
        );
    }

    pub fn rate_limit(&self, signature: &str, times: u32) {
        self.rate_limited.lock().unwrap().insert(signature.to_string(), times);
    }

    pub fn break_signature(&self, signature: &str, message: &str) {
        self.broken.lock().unwrap().insert(signature.to_string(), message.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.listing_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self, signature: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|s| *s == signature).count()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    async fn signatures_for_address(&self, limit: usize) -> ChainResult<Vec<SignatureInfo>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(ChainError::rpc("connection refused"));
        }
        Ok(self.history.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn get_transaction(&self, signature: &str) -> ChainResult<Option<ConfirmedTransaction>> {
        self.fetches.lock().unwrap().push(signature.to_string());

        if let Some(remaining) = self.rate_limited.lock().unwrap().get_mut(signature) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ChainError::rpc("HTTP status client error (429 Too Many Requests)"));
            }
        }
        if let Some(message) = self.broken.lock().unwrap().get(signature) {
            return Err(ChainError::rpc(message.clone()));
        }
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }

    async fn policies_for_gateway(&self, _gateway: &Pubkey) -> ChainResult<Vec<PaymentPolicy>> {
        Ok(Vec::new())
    }

    async fn execute_payment(&self, _policy: &PaymentPolicy) -> ChainResult<String> {
        Err(ChainError::Rpc("not supported by the indexer mock".to_string()))
    }
}

/// Payloads are `[tag, value]`: tag 1 is `PolicyCreated`, tag 2 is `PaymentExecuted`.
pub struct TestSchema;

impl EventSchema for TestSchema {
    fn event_names(&self) -> Vec<String> {
        vec!["PolicyCreated".to_string(), "PaymentExecuted".to_string()]
    }

    fn decode_event(&self, payload: &[u8]) -> ChainResult<Option<RawEvent>> {
        let name = match payload.first() {
            Some(1) => "PolicyCreated",
            Some(2) => "PaymentExecuted",
            _ => return Ok(None),
        };
        Ok(Some(RawEvent {
            name: name.to_string(),
            data: json!({ "value": payload.get(1).copied().unwrap_or_default() }),
        }))
    }
}

/// A successful transaction emitting one event per payload.
pub fn event_tx(program: &Pubkey, signature: &str, slot: u64, payloads: &[&[u8]]) -> ConfirmedTransaction {
    let mut logs = vec![format!("Program {} invoke [1]", program)];
    logs.extend(payloads.iter().map(|p| format!("Program data: {}", STANDARD.encode(p))));
    logs.push(format!("Program {} success", program));

    ConfirmedTransaction {
        signature: signature.to_string(),
        slot,
        block_time: Some(1_700_000_000 + slot as i64),
        meta: Some(TransactionMeta { err: None, log_messages: Some(logs) }),
        raw: json!({ "slot": slot }),
    }
}

pub fn failed_tx(signature: &str, slot: u64) -> ConfirmedTransaction {
    ConfirmedTransaction {
        signature: signature.to_string(),
        slot,
        block_time: None,
        meta: Some(TransactionMeta {
            err: Some(json!({ "InstructionError": [0, { "Custom": 6000 }] })),
            log_messages: Some(vec![]),
        }),
        raw: Value::Null,
    }
}

pub struct Pipeline {
    pub program: Pubkey,
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryBus>,
    pub tracker: Arc<ProgressTracker>,
    pub processor: Arc<TransactionProcessor>,
}

impl Pipeline {
    pub fn new() -> Self {
        let program = Pubkey::new_unique();
        let chain = Arc::new(MockChain::new(program));
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let tracker = Arc::new(ProgressTracker::new(store.clone(), PREFIX, WATCHER_COMPONENT));
        let publisher = Arc::new(TopicPublisher::new(bus.clone(), PREFIX));
        let processor = Arc::new(
            TransactionProcessor::new(chain.clone(), Arc::new(TestSchema), publisher, tracker.clone())
                .with_rate_limit_backoff(std::time::Duration::from_millis(1)),
        );
        Self { program, chain, store, bus, tracker, processor }
    }

    pub async fn processed(&self) -> Vec<String> {
        self.store.processed_signatures(self.tracker.signature_prefix()).await
    }
}
