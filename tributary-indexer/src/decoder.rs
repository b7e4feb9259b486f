//! Transaction log decoding
//!
//! Events are recovered from `Program data: <base64>` log lines. Only lines
//! written while the monitored program is the innermost running program are
//! considered, so CPI callees that happen to emit data never leak into the
//! stream.

use crate::core::{DecodedEvent, DecodedTransaction};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use tracing::warn;
use tributary_chain::{ConfirmedTransaction, EventSchema};

const PROGRAM_PREFIX: &str = "Program ";
const DATA_PREFIX: &str = "Program data: ";

/// Why a transaction yields nothing to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The node returned no transaction for the signature
    NotFound,
    /// The transaction executed with an error; carries `meta.err`
    FailedOnChain(Value),
    /// The transaction has no log output to scan
    NoLogs,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotFound => write!(f, "transaction not found"),
            DecodeError::FailedOnChain(err) => write!(f, "transaction failed on-chain: {}", err),
            DecodeError::NoLogs => write!(f, "no log messages"),
        }
    }
}

pub type DecodeResult = Result<DecodedTransaction, DecodeError>;

/// Turns confirmed transactions of one program into [`DecodedTransaction`]s.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    program_id: String,
}

impl EventDecoder {
    pub fn new(program_id: &Pubkey) -> Self {
        Self {
            program_id: program_id.to_string(),
        }
    }

    pub fn decode(
        &self,
        transaction: Option<&ConfirmedTransaction>,
        signature: &str,
        schema: &dyn EventSchema,
    ) -> DecodeResult {
        let tx = transaction.ok_or(DecodeError::NotFound)?;
        let meta = tx.meta.as_ref().ok_or(DecodeError::NotFound)?;
        if let Some(err) = &meta.err {
            return Err(DecodeError::FailedOnChain(err.clone()));
        }
        let logs = meta.log_messages.as_deref().ok_or(DecodeError::NoLogs)?;

        Ok(DecodedTransaction {
            signature: signature.to_string(),
            slot: tx.slot,
            block_time: tx.block_time,
            events: self.parse_logs(logs, signature, schema),
            transaction: tx.raw.clone(),
        })
    }

    /// Scan log lines in order, tracking the invoke stack.
    pub fn parse_logs(&self, logs: &[String], signature: &str, schema: &dyn EventSchema) -> Vec<DecodedEvent> {
        let mut stack: Vec<&str> = Vec::new();
        let mut events = Vec::new();

        for line in logs {
            if let Some(encoded) = line.strip_prefix(DATA_PREFIX) {
                if stack.last() != Some(&self.program_id.as_str()) {
                    continue;
                }
                let payload = match STANDARD.decode(encoded.trim()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(signature = %signature, error = %e, "Skipping malformed program data");
                        continue;
                    }
                };
                match schema.decode_event(&payload) {
                    Ok(Some(raw)) => events.push(DecodedEvent {
                        name: raw.name,
                        data: raw.data,
                        index: events.len(),
                    }),
                    Ok(None) => {}
                    Err(e) => warn!(signature = %signature, error = %e, "Skipping undecodable event"),
                }
                continue;
            }

            let Some(rest) = line.strip_prefix(PROGRAM_PREFIX) else {
                continue;
            };
            let mut parts = rest.split_whitespace();
            let (Some(program), Some(action)) = (parts.next(), parts.next()) else {
                continue;
            };
            match action {
                "invoke" => stack.push(program),
                "success" | "failed:" | "failed" => {
                    stack.pop();
                }
                _ => {}
            }
        }

        events
    }
}
