//! Combined watcher + catchup process

use crate::bus::TopicPublisher;
use crate::catchup::ChainCatchup;
use crate::config::IndexerConfig;
use crate::core::{EventBus, IdempotencyStore, IndexerError, IndexerResult, SignatureHandler};
use crate::processor::TransactionProcessor;
use crate::store::{ProgressTracker, WATCHER_COMPONENT};
use crate::watcher::ChainWatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tributary_chain::{ChainClient, EventSchema};

/// Tunables the service needs beyond its collaborators
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub topic_prefix: String,
    pub ws_url: String,
    pub commitment: String,
    pub catchup_interval: Duration,
    pub catchup_retry: Duration,
    pub catchup_limit: usize,
    pub rate_limit_backoff: Duration,
    pub reconnect_delay: Duration,
}

impl From<&IndexerConfig> for ServiceSettings {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            topic_prefix: config.kafka_topic_prefix.clone(),
            ws_url: config.websocket_url(),
            commitment: config.commitment.clone(),
            catchup_interval: config.catchup_interval(),
            catchup_retry: config.catchup_retry(),
            catchup_limit: config.catchup_limit,
            rate_limit_backoff: config.rate_limit_backoff(),
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

type TaskResult = Result<IndexerResult<()>, JoinError>;

enum Finished {
    Requested,
    Watcher(TaskResult),
    Catchup(TaskResult),
}

/// Resolves once `true` is observed or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn report_stopped(name: &str, result: TaskResult) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(task = name, error = %e, "Task failed while stopping"),
        Err(e) => error!(task = name, error = %e, "Task panicked while stopping"),
    }
}

/// The loops only return on their own when something is wrong.
fn unexpected_exit(name: &str, result: TaskResult) -> IndexerResult<()> {
    match result {
        Ok(Ok(())) => Err(IndexerError::Stream(format!("{} loop exited unexpectedly", name))),
        Ok(Err(e)) => {
            error!(task = name, error = %e, "Supervised task failed");
            Err(e)
        }
        Err(e) => Err(IndexerError::Stream(format!("{} task panicked: {}", name, e))),
    }
}

/// Owns the shared store, bus and processing path, and supervises the
/// realtime watcher and the periodic catchup as two tasks.
pub struct IndexerService {
    store: Arc<dyn IdempotencyStore>,
    bus: Arc<dyn EventBus>,
    schema: Arc<dyn EventSchema>,
    publisher: Arc<TopicPublisher>,
    processor: Arc<TransactionProcessor>,
    watcher: Arc<ChainWatcher>,
    catchup: Arc<ChainCatchup>,
    settings: ServiceSettings,
}

impl IndexerService {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        schema: Arc<dyn EventSchema>,
        store: Arc<dyn IdempotencyStore>,
        bus: Arc<dyn EventBus>,
        settings: ServiceSettings,
    ) -> Self {
        let tracker = Arc::new(ProgressTracker::new(store.clone(), &settings.topic_prefix, WATCHER_COMPONENT));
        let publisher = Arc::new(TopicPublisher::new(bus.clone(), settings.topic_prefix.clone()));
        let processor = Arc::new(
            TransactionProcessor::new(chain.clone(), schema.clone(), publisher.clone(), tracker.clone())
                .with_rate_limit_backoff(settings.rate_limit_backoff),
        );
        let watcher = Arc::new(
            ChainWatcher::new(processor.clone(), settings.ws_url.clone(), chain.program_id())
                .with_commitment(settings.commitment.clone())
                .with_reconnect_delay(settings.reconnect_delay),
        );
        let catchup = Arc::new(ChainCatchup::new(chain, tracker).with_limit(settings.catchup_limit));

        Self {
            store,
            bus,
            schema,
            publisher,
            processor,
            watcher,
            catchup,
            settings,
        }
    }

    pub fn processor(&self) -> &Arc<TransactionProcessor> {
        &self.processor
    }

    pub fn watcher(&self) -> &Arc<ChainWatcher> {
        &self.watcher
    }

    pub fn catchup(&self) -> &Arc<ChainCatchup> {
        &self.catchup
    }

    /// Create the transactions topic and one topic per declared event.
    /// Failure is logged; brokers with auto-creation still accept records.
    pub async fn initialize(&self) {
        let topics = self.publisher.all_topics(&self.schema.event_names());
        match self.bus.ensure_topics(&topics).await {
            Ok(()) => info!(count = topics.len(), "Bus topics ready"),
            Err(e) => warn!(error = %e, "Could not create bus topics; relying on broker auto-creation"),
        }
    }

    /// Run both loops until `shutdown` flips to `true` or one of them stops.
    ///
    /// Whatever ends the run, both loops are told to stop and awaited, and
    /// the bus and store are released before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> IndexerResult<()> {
        let (stop, _) = watch::channel(false);

        let mut watcher_task: JoinHandle<IndexerResult<()>> = {
            let watcher = self.watcher.clone();
            let signal = stop.subscribe();
            tokio::spawn(async move { watcher.run(signal).await })
        };
        let mut catchup_task: JoinHandle<IndexerResult<()>> = {
            let catchup = self.catchup.clone();
            let handler: Arc<dyn SignatureHandler> = self.processor.clone();
            let signal = stop.subscribe();
            let interval = self.settings.catchup_interval;
            let retry = self.settings.catchup_retry;
            tokio::spawn(async move { catchup.run_periodic(handler, interval, retry, signal).await })
        };
        info!("Watcher and catchup started");

        let finished = tokio::select! {
            result = &mut watcher_task => Finished::Watcher(result),
            result = &mut catchup_task => Finished::Catchup(result),
            _ = wait_for_shutdown(&mut shutdown) => Finished::Requested,
        };
        stop.send_replace(true);

        let outcome = match finished {
            Finished::Requested => {
                info!("Shutdown requested; stopping watcher and catchup");
                for (name, task) in [("watcher", watcher_task), ("catchup", catchup_task)] {
                    report_stopped(name, task.await);
                }
                Ok(())
            }
            Finished::Watcher(result) => {
                report_stopped("catchup", catchup_task.await);
                unexpected_exit("watcher", result)
            }
            Finished::Catchup(result) => {
                report_stopped("watcher", watcher_task.await);
                unexpected_exit("catchup", result)
            }
        };

        self.close().await;
        outcome
    }

    /// Close the bus producer, then disconnect the store.
    pub async fn close(&self) {
        self.bus.close().await;
        self.store.disconnect().await;
        info!("Bus and store released");
    }
}
