//! Tributary chain event producer
//!
//! Watches the Tributary program's logs in real time, reconciles missed
//! transactions through a periodic catchup pass, and publishes decoded events
//! to Kafka. Redis holds the per-signature dedup records shared by both paths.

pub mod bus;
pub mod catchup;
pub mod config;
pub mod core;
pub mod decoder;
pub mod processor;
pub mod service;
pub mod store;
pub mod watcher;

pub use crate::bus::{MemoryBus, PublishReport, RestProxyBus, TopicPublisher};
pub use crate::catchup::ChainCatchup;
pub use crate::config::IndexerConfig;
pub use crate::core::*;
pub use crate::decoder::{DecodeError, DecodeResult, EventDecoder};
pub use crate::processor::TransactionProcessor;
pub use crate::service::{IndexerService, ServiceSettings};
pub use crate::store::{MemoryStore, ProgressTracker, RedisStore, WATCHER_COMPONENT};
pub use crate::watcher::{ChainWatcher, LogNotification, WatcherState};
