//! Core trait abstractions (ports)

use super::error::IndexerResult;
use super::types::{Checkpoint, ProcessOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Durable dedup and checkpoint storage.
///
/// Fails open: when the backing store is unreachable, reads report
/// "not processed" / "no checkpoint" and writes report `false`. Ingestion
/// keeps going and may re-deliver, which downstream consumers tolerate.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Write a `prefix + signature` record with the store's TTL.
    async fn store_signature(&self, signature: &str, prefix: &str) -> bool;

    async fn is_processed(&self, signature: &str, prefix: &str) -> bool;

    async fn save_checkpoint(&self, key: &str, signature: &str, extra: Map<String, Value>) -> bool;

    async fn get_checkpoint(&self, key: &str) -> Option<Checkpoint>;

    async fn disconnect(&self);
}

/// Message bus producer
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Create any of `topics` that do not exist yet.
    async fn ensure_topics(&self, topics: &[String]) -> IndexerResult<()>;

    async fn send(&self, topic: &str, payload: &Value) -> IndexerResult<()>;

    /// Flush and release producer and admin connections.
    async fn close(&self);
}

/// The shared fetch -> decode -> publish path, as seen by the catchup loop.
#[async_trait]
pub trait SignatureHandler: Send + Sync {
    async fn handle(&self, signature: &str) -> IndexerResult<ProcessOutcome>;
}
