//! Realtime log watcher
//!
//! Holds a `logsSubscribe` websocket subscription for the program and runs
//! every successful signature it announces through the processing path.

use crate::core::{Checkpoint, IndexerResult, ProcessOutcome};
use crate::processor::TransactionProcessor;
use crate::store::ProgressTracker;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Disconnected,
    Connecting,
    Subscribed,
    Closed,
}

/// A log notification for a transaction that succeeded on-chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNotification {
    pub signature: String,
    pub slot: Option<u64>,
}

/// Parse an inbound websocket frame. Subscription acks, notifications for
/// failed transactions and anything unrecognised yield `None`.
pub fn parse_notification(text: &str) -> Option<LogNotification> {
    let message: Value = serde_json::from_str(text).ok()?;
    let result = message.get("params")?.get("result")?;
    let value = result.get("value")?;

    if value.get("err").is_some_and(|err| !err.is_null()) {
        return None;
    }

    Some(LogNotification {
        signature: value.get("signature")?.as_str()?.to_string(),
        slot: result.get("context").and_then(|c| c.get("slot")).and_then(Value::as_u64),
    })
}

/// Derive the websocket endpoint from an HTTP RPC URL.
pub fn websocket_url(rpc_url: &str) -> String {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        rpc_url.to_string()
    }
}

pub struct ChainWatcher {
    processor: Arc<TransactionProcessor>,
    tracker: Arc<ProgressTracker>,
    ws_url: String,
    program_id: Pubkey,
    commitment: String,
    reconnect_delay: Duration,
    state: watch::Sender<WatcherState>,
}

impl ChainWatcher {
    pub fn new(processor: Arc<TransactionProcessor>, ws_url: impl Into<String>, program_id: Pubkey) -> Self {
        let (state, _) = watch::channel(WatcherState::Disconnected);
        Self {
            tracker: processor.tracker().clone(),
            processor,
            ws_url: ws_url.into(),
            program_id,
            commitment: "confirmed".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state,
        }
    }

    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WatcherState) {
        self.state.send_replace(state);
    }

    pub fn subscribe_request(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "logsSubscribe",
            "params": [
                { "mentions": [self.program_id.to_string()] },
                { "commitment": self.commitment },
            ],
        })
    }

    /// Process one announced signature and, once fully published, record it
    /// and advance the checkpoint.
    pub async fn handle_signature(&self, notification: &LogNotification) -> IndexerResult<ProcessOutcome> {
        let signature = notification.signature.as_str();
        let outcome = self.processor.process(signature, false).await?;

        if outcome.should_mark() {
            self.tracker.mark_processed(signature).await;
            let mut extra = Map::new();
            if let Some(slot) = notification.slot {
                extra.insert("slot".to_string(), json!(slot));
            }
            extra.insert("source".to_string(), json!("watcher"));
            self.tracker.save_checkpoint(signature, extra).await;
        }
        Ok(outcome)
    }

    pub async fn get_last_checkpoint(&self) -> Option<Checkpoint> {
        self.tracker.last_checkpoint().await
    }

    /// Reconnect loop. Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> IndexerResult<()> {
        while !*shutdown.borrow() {
            match self.monitor(&mut shutdown).await {
                Ok(true) => break,
                Ok(false) => warn!("WebSocket connection closed. Reconnecting..."),
                Err(e) => error!(error = %e, "WebSocket error"),
            }
            self.set_state(WatcherState::Closed);

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(WatcherState::Closed);
        info!("Watcher stopped");
        Ok(())
    }

    /// One connection lifetime. `Ok(true)` means shutdown was requested.
    async fn monitor(&self, shutdown: &mut watch::Receiver<bool>) -> IndexerResult<bool> {
        self.set_state(WatcherState::Connecting);
        info!(url = %self.ws_url, "Connecting to log stream");

        let (stream, _response) = tokio::select! {
            connected = connect_async(self.ws_url.as_str()) => connected?,
            _ = shutdown.changed() => return Ok(true),
        };
        let (mut write, mut read) = stream.split();

        write.send(Message::Text(self.subscribe_request().to_string())).await?;
        self.set_state(WatcherState::Subscribed);
        info!(program = %self.program_id, commitment = %self.commitment, "Subscribed to program logs");

        loop {
            let frame = tokio::select! {
                frame = read.next() => frame,
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(true);
                }
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(notification) = parse_notification(&text) else {
                        debug!("Ignoring non-notification frame");
                        continue;
                    };
                    tokio::select! {
                        result = self.handle_signature(&notification) => {
                            if let Err(e) = result {
                                error!(signature = %notification.signature, error = %e, "Error processing log notification");
                            }
                        }
                        _ = shutdown.changed() => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(true);
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Log stream closed by server");
                    return Ok(false);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notification() {
        let frame = r#"{
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": { "slot": 5208469 },
                    "value": { "signature": "5h6xBEauJ3PK6SWC", "err": null, "logs": [] }
                },
                "subscription": 24040
            }
        }"#;
        assert_eq!(
            parse_notification(frame),
            Some(LogNotification { signature: "5h6xBEauJ3PK6SWC".to_string(), slot: Some(5208469) })
        );
    }

    #[test]
    fn test_ignores_acks_and_failed_transactions() {
        assert_eq!(parse_notification(r#"{"jsonrpc":"2.0","result":24040,"id":1}"#), None);
        assert_eq!(parse_notification("not json"), None);

        let failed = r#"{"params":{"result":{"value":{"signature":"x","err":{"InstructionError":[0,"Custom"]}}}}}"#;
        assert_eq!(parse_notification(failed), None);
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(websocket_url("https://api.devnet.solana.com"), "wss://api.devnet.solana.com");
        assert_eq!(websocket_url("http://127.0.0.1:8899"), "ws://127.0.0.1:8899");
        assert_eq!(websocket_url("wss://already"), "wss://already");
    }
}
