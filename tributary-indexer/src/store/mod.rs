//! Idempotency and checkpoint storage

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::core::{Checkpoint, IdempotencyStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Key namespace shared by the watcher and the catchup loop so each sees the other's work
pub const WATCHER_COMPONENT: &str = "chainwatcher";

/// Dedup and checkpoint operations for one logical stream.
///
/// Keys are `{prefix}-{component}-sig:{signature}` and
/// `{prefix}-{component}-checkpoint`.
pub struct ProgressTracker {
    store: Arc<dyn IdempotencyStore>,
    signature_prefix: String,
    checkpoint_key: String,
    // serializes checkpoint writes so the persisted timestamp never moves backwards
    checkpoint_lock: Mutex<()>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn IdempotencyStore>, topic_prefix: &str, component: &str) -> Self {
        Self {
            store,
            signature_prefix: format!("{}-{}-sig:", topic_prefix, component),
            checkpoint_key: format!("{}-{}-checkpoint", topic_prefix, component),
            checkpoint_lock: Mutex::new(()),
        }
    }

    pub fn signature_prefix(&self) -> &str {
        &self.signature_prefix
    }

    pub fn checkpoint_key(&self) -> &str {
        &self.checkpoint_key
    }

    pub async fn is_processed(&self, signature: &str) -> bool {
        self.store.is_processed(signature, &self.signature_prefix).await
    }

    pub async fn mark_processed(&self, signature: &str) -> bool {
        let stored = self.store.store_signature(signature, &self.signature_prefix).await;
        if !stored {
            warn!(signature = %signature, "Could not record processed signature; it may be delivered again");
        }
        stored
    }

    pub async fn save_checkpoint(&self, signature: &str, extra: Map<String, Value>) -> bool {
        let _guard = self.checkpoint_lock.lock().await;
        self.store.save_checkpoint(&self.checkpoint_key, signature, extra).await
    }

    pub async fn last_checkpoint(&self) -> Option<Checkpoint> {
        self.store.get_checkpoint(&self.checkpoint_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keys_follow_prefix_layout() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ProgressTracker::new(store.clone(), "tributary", WATCHER_COMPONENT);

        assert_eq!(tracker.signature_prefix(), "tributary-chainwatcher-sig:");
        assert_eq!(tracker.checkpoint_key(), "tributary-chainwatcher-checkpoint");

        assert!(!tracker.is_processed("5xyz").await);
        assert!(tracker.mark_processed("5xyz").await);
        assert!(tracker.is_processed("5xyz").await);
        assert!(store.contains_key("tributary-chainwatcher-sig:5xyz").await);
    }

    #[tokio::test]
    async fn test_checkpoint_timestamps_never_decrease() {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(ProgressTracker::new(store.clone(), "tributary", WATCHER_COMPONENT));

        let mut handles = Vec::new();
        for i in 0..20 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.save_checkpoint(&format!("sig-{}", i), Map::new()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let writes = store.checkpoint_writes(tracker.checkpoint_key()).await;
        assert_eq!(writes.len(), 20);
        assert!(writes.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(tracker.last_checkpoint().await, writes.last().cloned());
    }
}
