//! Redis-backed idempotency store

use crate::core::{Checkpoint, IdempotencyStore, IndexerError, IndexerResult, SignatureRecord};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Signature records expire after 30 days by default
pub const DEFAULT_SIGNATURE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Redis store that connects lazily and never blocks callers for longer
/// than its operation timeout.
pub struct RedisStore {
    client: Client,
    manager: RwLock<Option<ConnectionManager>>,
    signature_ttl: Duration,
    op_timeout: Duration,
}

impl RedisStore {
    /// Only an unparseable URL fails here; an unreachable server is retried on use.
    pub fn new(url: &str, signature_ttl: Duration, op_timeout: Duration) -> IndexerResult<Self> {
        let client = Client::open(url)
            .map_err(|e| IndexerError::Configuration(format!("invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            manager: RwLock::new(None),
            signature_ttl,
            op_timeout,
        })
    }

    /// Attempt the initial connection. `false` means "not yet connected".
    pub async fn connect(&self) -> bool {
        self.connection().await.is_some()
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        if let Some(manager) = self.manager.read().await.as_ref() {
            return Some(manager.clone());
        }

        let mut slot = self.manager.write().await;
        if let Some(manager) = slot.as_ref() {
            return Some(manager.clone());
        }

        match timeout(self.op_timeout, ConnectionManager::new(self.client.clone())).await {
            Ok(Ok(manager)) => {
                info!("Connected to Redis");
                *slot = Some(manager.clone());
                Some(manager)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Redis not connected");
                None
            }
            Err(_) => {
                warn!(timeout = ?self.op_timeout, "Redis connection attempt timed out");
                None
            }
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Option<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match timeout(self.op_timeout, f(conn)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(op, error = %e, "Redis operation failed");
                None
            }
            Err(_) => {
                warn!(op, timeout = ?self.op_timeout, "Redis operation timed out");
                None
            }
        }
    }
}

#[async_trait]
impl IdempotencyStore for RedisStore {
    async fn store_signature(&self, signature: &str, prefix: &str) -> bool {
        let key = format!("{}{}", prefix, signature);
        let record = SignatureRecord {
            signature: signature.to_string(),
            processed_at: chrono::Utc::now().timestamp_millis(),
        };
        let Ok(value) = serde_json::to_string(&record) else {
            return false;
        };
        let ttl_secs = self.signature_ttl.as_secs();

        self.run("set_ex", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await
        .is_some()
    }

    async fn is_processed(&self, signature: &str, prefix: &str) -> bool {
        let key = format!("{}{}", prefix, signature);
        self.run("exists", |mut conn| async move { conn.exists::<_, bool>(key).await })
            .await
            .unwrap_or(false)
    }

    async fn save_checkpoint(&self, key: &str, signature: &str, extra: Map<String, Value>) -> bool {
        let checkpoint = Checkpoint {
            last_signature: signature.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            extra,
        };
        let Ok(value) = serde_json::to_string(&checkpoint) else {
            return false;
        };
        let key = key.to_string();

        self.run("set", |mut conn| async move { conn.set::<_, _, ()>(key, value).await })
            .await
            .is_some()
    }

    async fn get_checkpoint(&self, key: &str) -> Option<Checkpoint> {
        let key = key.to_string();
        let raw = self
            .run("get", |mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await??;

        match serde_json::from_str(&raw) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed checkpoint");
                None
            }
        }
    }

    async fn disconnect(&self) {
        if self.manager.write().await.take().is_some() {
            debug!("Redis connection released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        let result = RedisStore::new("not a url", DEFAULT_SIGNATURE_TTL, Duration::from_secs(1));
        assert!(matches!(result, Err(IndexerError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_fails_open_when_unreachable() {
        // nothing listens on port 1
        let store = RedisStore::new("redis://127.0.0.1:1", DEFAULT_SIGNATURE_TTL, Duration::from_millis(200)).unwrap();

        assert!(!store.connect().await);
        assert!(!store.store_signature("sig", "p:").await);
        assert!(!store.is_processed("sig", "p:").await);
        assert!(store.get_checkpoint("p-checkpoint").await.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires running Redis
    async fn test_redis_roundtrip() {
        let store = RedisStore::new("redis://localhost:6379", Duration::from_secs(60), Duration::from_secs(2)).unwrap();
        assert!(store.connect().await);

        assert!(store.store_signature("roundtrip", "test-sig:").await);
        assert!(store.is_processed("roundtrip", "test-sig:").await);

        assert!(store.save_checkpoint("test-checkpoint", "roundtrip", Map::new()).await);
        let checkpoint = store.get_checkpoint("test-checkpoint").await.unwrap();
        assert_eq!(checkpoint.last_signature, "roundtrip");

        store.disconnect().await;
    }
}
