//! In-memory idempotency store for tests and local runs

use crate::core::{Checkpoint, IdempotencyStore, SignatureRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Store backed by a `HashMap`, with optional TTL and a switch that
/// simulates an unreachable backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    checkpoint_history: Mutex<Vec<(String, Checkpoint)>>,
    signature_ttl: Option<Duration>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(signature_ttl: Duration) -> Self {
        Self {
            signature_ttl: Some(signature_ttl),
            ..Self::default()
        }
    }

    /// While offline every operation behaves like an unreachable Redis.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.lock().await.get(key).is_some_and(|e| e.is_live(now))
    }

    /// Live signatures recorded under `prefix`
    pub async fn processed_signatures(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut signatures: Vec<String> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .filter_map(|(key, _)| key.strip_prefix(prefix).map(str::to_string))
            .collect();
        signatures.sort();
        signatures
    }

    /// Every checkpoint written to `key`, in write order
    pub async fn checkpoint_writes(&self, key: &str) -> Vec<Checkpoint> {
        self.checkpoint_history
            .lock()
            .await
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, checkpoint)| checkpoint.clone())
            .collect()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn store_signature(&self, signature: &str, prefix: &str) -> bool {
        if self.is_offline() {
            return false;
        }
        let record = SignatureRecord {
            signature: signature.to_string(),
            processed_at: chrono::Utc::now().timestamp_millis(),
        };
        let Ok(value) = serde_json::to_string(&record) else {
            return false;
        };
        let expires_at = self.signature_ttl.map(|ttl| Instant::now() + ttl);

        self.entries
            .lock()
            .await
            .insert(format!("{}{}", prefix, signature), Entry { value, expires_at });
        true
    }

    async fn is_processed(&self, signature: &str, prefix: &str) -> bool {
        if self.is_offline() {
            return false;
        }
        self.contains_key(&format!("{}{}", prefix, signature)).await
    }

    async fn save_checkpoint(&self, key: &str, signature: &str, extra: Map<String, Value>) -> bool {
        if self.is_offline() {
            return false;
        }
        let checkpoint = Checkpoint {
            last_signature: signature.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            extra,
        };
        let Ok(value) = serde_json::to_string(&checkpoint) else {
            return false;
        };

        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires_at: None });
        self.checkpoint_history.lock().await.push((key.to_string(), checkpoint));
        true
    }

    async fn get_checkpoint(&self, key: &str) -> Option<Checkpoint> {
        if self.is_offline() {
            return None;
        }
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        serde_json::from_str(&entry.value).ok()
    }

    async fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_signature_records_expire() {
        let store = MemoryStore::with_ttl(Duration::from_millis(20));
        assert!(store.store_signature("sig", "p:").await);
        assert!(store.is_processed("sig", "p:").await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.is_processed("sig", "p:").await);
    }

    #[tokio::test]
    async fn test_offline_store_fails_open() {
        let store = MemoryStore::new();
        assert!(store.store_signature("sig", "p:").await);

        store.set_offline(true);
        assert!(!store.is_processed("sig", "p:").await);
        assert!(!store.store_signature("other", "p:").await);
        assert!(!store.save_checkpoint("cp", "sig", Map::new()).await);
        assert!(store.get_checkpoint("cp").await.is_none());

        store.set_offline(false);
        assert!(store.is_processed("sig", "p:").await);
        assert_eq!(store.processed_signatures("p:").await, vec!["sig".to_string()]);
    }

    #[tokio::test]
    async fn test_checkpoint_keeps_extra_fields() {
        let store = MemoryStore::new();
        let mut extra = Map::new();
        extra.insert("slot".to_string(), json!(12));

        assert!(store.save_checkpoint("cp", "first", Map::new()).await);
        assert!(store.save_checkpoint("cp", "second", extra).await);

        let checkpoint = store.get_checkpoint("cp").await.unwrap();
        assert_eq!(checkpoint.last_signature, "second");
        assert_eq!(checkpoint.extra["slot"], json!(12));
        assert_eq!(store.checkpoint_writes("cp").await.len(), 2);
    }
}
