//! Program boundary for the Tributary recurring-payments program
//!
//! Everything that knows about Solana RPC, the program's IDL, its event
//! encoding, its payment-policy account layout and its payment instruction
//! lives here. The indexer and the scheduler only see [`ChainClient`] and
//! [`EventSchema`].

pub mod client;
pub mod decode;
pub mod error;
pub mod events;
pub mod idl;
pub mod payment;
pub mod policy;
pub mod rpc;
pub mod types;

pub use client::ChainClient;
pub use error::{ChainError, ChainResult};
pub use events::{EventSchema, IdlEventSchema, RawEvent};
pub use idl::Idl;
pub use rpc::{load_keypair, SolanaChainClient};
pub use types::{
    ConfirmedTransaction, PaymentPolicy, PolicyStatus, PolicyType, SignatureInfo, TransactionMeta,
};
