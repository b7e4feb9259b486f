//! Core abstractions and types
//!
//! Ports the pipeline is written against (idempotency store, event bus,
//! signature handler), the data carried between stages, and the error model.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{IndexerError, IndexerResult};
pub use traits::{EventBus, IdempotencyStore, SignatureHandler};
pub use types::{
    Checkpoint, DecodedEvent, DecodedTransaction, EventMessage, ProcessOutcome, SignatureRecord,
    TransactionMessage,
};
