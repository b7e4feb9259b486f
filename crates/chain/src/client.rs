//! Chain access port shared by the indexer and the scheduler

use crate::error::ChainResult;
use crate::types::{ConfirmedTransaction, PaymentPolicy, SignatureInfo};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

/// Capabilities this service needs from the chain and the program client.
///
/// Everything program-specific sits behind this trait so the ingestion and
/// scheduling logic never touches a concrete SDK type.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the monitored program
    fn program_id(&self) -> Pubkey;

    /// Most recent signatures mentioning the program, newest first.
    async fn signatures_for_address(&self, limit: usize) -> ChainResult<Vec<SignatureInfo>>;

    /// `Ok(None)` when the node does not know the transaction (yet).
    async fn get_transaction(&self, signature: &str) -> ChainResult<Option<ConfirmedTransaction>>;

    /// Payment policies whose gateway is `gateway`.
    async fn policies_for_gateway(&self, gateway: &Pubkey) -> ChainResult<Vec<PaymentPolicy>>;

    /// Build, sign, submit and confirm the payment instruction for `policy`.
    /// Returns the transaction signature.
    async fn execute_payment(&self, policy: &PaymentPolicy) -> ChainResult<String>;
}
