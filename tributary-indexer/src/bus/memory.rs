//! In-memory bus that records every message

use crate::core::{EventBus, IndexerError, IndexerResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryBus {
    messages: Mutex<Vec<(String, Value)>>,
    topics: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `topic` fail until further notice.
    pub async fn fail_topic(&self, topic: &str) {
        self.failing.lock().await.insert(topic.to_string());
    }

    pub async fn heal_topic(&self, topic: &str) {
        self.failing.lock().await.remove(topic);
    }

    /// `(topic, payload)` pairs in send order
    pub async fn messages(&self) -> Vec<(String, Value)> {
        self.messages.lock().await.clone()
    }

    pub async fn messages_for(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub async fn topics(&self) -> HashSet<String> {
        self.topics.lock().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn ensure_topics(&self, topics: &[String]) -> IndexerResult<()> {
        self.topics.lock().await.extend(topics.iter().cloned());
        Ok(())
    }

    async fn send(&self, topic: &str, payload: &Value) -> IndexerResult<()> {
        if self.is_closed() {
            return Err(IndexerError::Bus("producer closed".to_string()));
        }
        if self.failing.lock().await.contains(topic) {
            return Err(IndexerError::Bus(format!("send to {} rejected", topic)));
        }
        self.messages.lock().await.push((topic.to_string(), payload.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
