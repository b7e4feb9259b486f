//! Historical catchup
//!
//! The realtime feed drops messages while disconnected. Catchup replays the
//! most recent signatures for the program, oldest first, through the same
//! processing path, and relies on the dedup store to skip what the watcher
//! already handled.

use crate::core::{Checkpoint, IndexerResult, SignatureHandler};
use crate::store::ProgressTracker;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};
use tributary_chain::ChainClient;

pub const DEFAULT_CATCHUP_LIMIT: usize = 1000;
pub const DEFAULT_CATCHUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CATCHUP_RETRY: Duration = Duration::from_secs(5 * 60);

pub struct ChainCatchup {
    chain: Arc<dyn ChainClient>,
    tracker: Arc<ProgressTracker>,
    limit: usize,
}

impl ChainCatchup {
    pub fn new(chain: Arc<dyn ChainClient>, tracker: Arc<ProgressTracker>) -> Self {
        Self {
            chain,
            tracker,
            limit: DEFAULT_CATCHUP_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Replay up to `limit` recent signatures. Returns how many were processed
    /// and recorded in this pass.
    ///
    /// Each item is recorded and checkpointed as soon as it is handled, so a
    /// crash mid-pass repeats at most the item in flight. A failure on one
    /// signature is logged and the pass moves on; only listing failures abort.
    pub async fn catch_up(&self, handler: &dyn SignatureHandler) -> IndexerResult<usize> {
        info!(limit = self.limit, "Starting catchup over recent program signatures");

        let mut signatures = self.chain.signatures_for_address(self.limit).await?;
        signatures.reverse();
        let total = signatures.len();

        let mut processed = 0;
        for info in signatures {
            let signature = info.signature.as_str();
            if self.tracker.is_processed(signature).await {
                debug!(signature = %signature, "Skipping already processed transaction");
                continue;
            }

            match handler.handle(signature).await {
                Ok(outcome) if outcome.should_mark() => {
                    self.tracker.mark_processed(signature).await;
                    let mut extra = Map::new();
                    extra.insert("slot".to_string(), json!(info.slot));
                    extra.insert("source".to_string(), json!("catchup"));
                    self.tracker.save_checkpoint(signature, extra).await;
                    processed += 1;
                }
                Ok(outcome) => {
                    debug!(signature = %signature, outcome = ?outcome, "Left eligible for a later pass");
                }
                Err(e) => {
                    error!(signature = %signature, error = %e, "Failed to process signature during catchup");
                }
            }
        }

        info!(processed, listed = total, "Catchup completed");
        Ok(processed)
    }

    pub async fn get_last_checkpoint(&self) -> Option<Checkpoint> {
        self.tracker.last_checkpoint().await
    }

    /// Catch up now, then every `interval`; after a failed pass wait `retry`
    /// instead. Returns when `shutdown` flips to `true` or its sender is dropped.
    pub async fn run_periodic(
        &self,
        handler: Arc<dyn SignatureHandler>,
        interval: Duration,
        retry: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = tokio::select! {
                result = self.catch_up(handler.as_ref()) => match result {
                    Ok(_) => interval,
                    Err(e) => {
                        error!(error = %e, retry = ?retry, "Catchup failed");
                        retry
                    }
                },
                _ = shutdown.changed() => break,
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Catchup loop stopped");
        Ok(())
    }
}
