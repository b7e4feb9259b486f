//! Shared fetch -> decode -> publish path used by the watcher and catchup

use crate::bus::TopicPublisher;
use crate::core::{IndexerResult, ProcessOutcome, SignatureHandler};
use crate::decoder::EventDecoder;
use crate::store::ProgressTracker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tributary_chain::{ChainClient, ConfirmedTransaction, EventSchema};

/// Default wait between attempts while the RPC endpoint is throttling us
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(20);

pub struct TransactionProcessor {
    chain: Arc<dyn ChainClient>,
    schema: Arc<dyn EventSchema>,
    decoder: EventDecoder,
    publisher: Arc<TopicPublisher>,
    tracker: Arc<ProgressTracker>,
    rate_limit_backoff: Duration,
}

impl TransactionProcessor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        schema: Arc<dyn EventSchema>,
        publisher: Arc<TopicPublisher>,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        let decoder = EventDecoder::new(&chain.program_id());
        Self {
            chain,
            schema,
            decoder,
            publisher,
            tracker,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Fetch a transaction, waiting out rate limits indefinitely.
    /// Any other RPC failure is returned to the caller.
    pub async fn fetch_transaction(&self, signature: &str) -> IndexerResult<Option<ConfirmedTransaction>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.chain.get_transaction(signature).await {
                Ok(tx) => return Ok(tx),
                Err(e) if e.is_rate_limited() => {
                    warn!(
                        signature = %signature,
                        attempt,
                        backoff = ?self.rate_limit_backoff,
                        "Rate limited. Waiting before retry..."
                    );
                    tokio::time::sleep(self.rate_limit_backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run one signature through the pipeline.
    ///
    /// Marking the signature processed and advancing the checkpoint is left to
    /// the caller, which knows which stream it is advancing.
    pub async fn process(&self, signature: &str, skip_check: bool) -> IndexerResult<ProcessOutcome> {
        if !skip_check && self.tracker.is_processed(signature).await {
            debug!(signature = %signature, "Skipping already processed transaction");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        info!(signature = %signature, "Processing transaction");
        let tx = self.fetch_transaction(signature).await?;

        let decoded = match self.decoder.decode(tx.as_ref(), signature, self.schema.as_ref()) {
            Ok(decoded) => decoded,
            Err(reason) => {
                info!(signature = %signature, reason = %reason, "Nothing to publish");
                return Ok(ProcessOutcome::Rejected(reason));
            }
        };

        let report = self.publisher.publish(&decoded).await;
        if report.is_complete() {
            Ok(ProcessOutcome::Published {
                events: decoded.events.len(),
            })
        } else {
            warn!(
                signature = %signature,
                failed = report.failed,
                "Publish incomplete; signature left eligible for retry"
            );
            Ok(ProcessOutcome::PublishFailed { failed: report.failed })
        }
    }
}

#[async_trait]
impl SignatureHandler for TransactionProcessor {
    /// Catchup pre-filters processed signatures, so the dedup check is skipped.
    async fn handle(&self, signature: &str) -> IndexerResult<ProcessOutcome> {
        self.process(signature, true).await
    }
}
