//! Solana JSON-RPC implementation of [`ChainClient`]

use crate::client::ChainClient;
use crate::error::{ChainError, ChainResult};
use crate::events::IdlEventSchema;
use crate::idl::Idl;
use crate::payment::build_execute_payment;
use crate::policy::PolicyDecoder;
use crate::types::{ConfirmedTransaction, PaymentPolicy, SignatureInfo, TransactionMeta};
use async_trait::async_trait;
use serde_json::{json, Value};
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTransactionConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::RpcRequest;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SolanaChainClient {
    rpc: RpcClient,
    program_id: Pubkey,
    commitment: CommitmentConfig,
    idl: Arc<Idl>,
    schema: Arc<IdlEventSchema>,
    policies: PolicyDecoder,
    signer: Option<Arc<Keypair>>,
}

impl SolanaChainClient {
    pub fn new(rpc_url: &str, program_id: Pubkey, idl: Idl, commitment: CommitmentConfig) -> Self {
        let idl = Arc::new(idl);
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            program_id,
            commitment,
            schema: Arc::new(IdlEventSchema::new(idl.clone())),
            policies: PolicyDecoder::new(idl.clone()),
            idl,
            signer: None,
        }
    }

    /// Attach the gateway keypair used to sign payment transactions.
    pub fn with_signer(mut self, keypair: Keypair) -> Self {
        self.signer = Some(Arc::new(keypair));
        self
    }

    pub fn signer_pubkey(&self) -> Option<Pubkey> {
        self.signer.as_ref().map(|k| k.pubkey())
    }

    pub fn event_schema(&self) -> Arc<IdlEventSchema> {
        self.schema.clone()
    }
}

/// Reads a JSON byte-array keypair file, as written by `solana-keygen`.
pub fn load_keypair(path: impl AsRef<Path>) -> ChainResult<Keypair> {
    let path = path.as_ref();
    read_keypair_file(path)
        .map_err(|e| ChainError::Keypair(format!("failed to read {}: {}", path.display(), e)))
}

/// Converts a `getTransaction` result into a [`ConfirmedTransaction`].
pub fn parse_transaction(signature: &str, raw: Value) -> ConfirmedTransaction {
    let meta = raw
        .get("meta")
        .filter(|m| !m.is_null())
        .map(|m| TransactionMeta {
            err: m.get("err").filter(|e| !e.is_null()).cloned(),
            log_messages: m
                .get("logMessages")
                .and_then(|logs| serde_json::from_value(logs.clone()).ok()),
        });

    ConfirmedTransaction {
        signature: signature.to_string(),
        slot: raw["slot"].as_u64().unwrap_or_default(),
        block_time: raw["blockTime"].as_i64(),
        meta,
        raw,
    }
}

#[async_trait]
impl ChainClient for SolanaChainClient {
    fn program_id(&self) -> Pubkey {
        self.program_id
    }

    async fn signatures_for_address(&self, limit: usize) -> ChainResult<Vec<SignatureInfo>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(&self.program_id, config)
            .await?;

        Ok(statuses
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
                block_time: s.block_time,
                failed: s.err.is_some(),
            })
            .collect())
    }

    async fn get_transaction(&self, signature: &str) -> ChainResult<Option<ConfirmedTransaction>> {
        Signature::from_str(signature).map_err(|_| ChainError::InvalidSignature(signature.to_string()))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let raw: Option<Value> = self
            .rpc
            .send(RpcRequest::GetTransaction, json!([signature, config]))
            .await?;

        Ok(raw.map(|raw| parse_transaction(signature, raw)))
    }

    async fn policies_for_gateway(&self, gateway: &Pubkey) -> ChainResult<Vec<PaymentPolicy>> {
        let mut filters = vec![RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            0,
            self.policies.discriminator().to_vec(),
        ))];
        let gateway_offset = self.policies.gateway_offset();
        if let Some(offset) = gateway_offset {
            filters.push(RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
                offset,
                gateway.to_bytes().to_vec(),
            )));
        }

        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };
        let accounts = self
            .rpc
            .get_program_accounts_with_config(&self.program_id, config)
            .await?;
        debug!(count = accounts.len(), "Fetched payment policy accounts");

        let gateway_str = gateway.to_string();
        let mut policies = Vec::with_capacity(accounts.len());
        for (address, account) in accounts {
            match self.policies.decode(address, &account.data) {
                Ok(policy) => {
                    // without a fixed offset the gateway could not be filtered server-side
                    if gateway_offset.is_none() && policy.fields["gateway"].as_str() != Some(gateway_str.as_str()) {
                        continue;
                    }
                    policies.push(policy);
                }
                Err(e) => warn!(account = %address, error = %e, "Skipping undecodable policy account"),
            }
        }
        Ok(policies)
    }

    async fn execute_payment(&self, policy: &PaymentPolicy) -> ChainResult<String> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ChainError::Keypair("no gateway keypair configured".to_string()))?;
        let payer = signer.pubkey();

        let instruction = build_execute_payment(&self.idl, &self.program_id, policy, &payer)?;
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction =
            Transaction::new_signed_with_payer(&[instruction], Some(&payer), &[signer.as_ref()], blockhash);

        let signature = self.rpc.send_and_confirm_transaction(&transaction).await?;
        Ok(signature.to_string())
    }
}
