//! Payment policy account decoding

use crate::decode::{BorshReader, IdlDecoder};
use crate::error::{ChainError, ChainResult};
use crate::idl::{Idl, DISCRIMINATOR_LEN};
use crate::types::{PaymentPolicy, PolicyStatus, PolicyType};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

pub const POLICY_ACCOUNT: &str = "PaymentPolicy";

/// Reads `PaymentPolicy` accounts using the layout declared in the IDL.
pub struct PolicyDecoder {
    idl: Arc<Idl>,
    discriminator: [u8; DISCRIMINATOR_LEN],
}

impl PolicyDecoder {
    pub fn new(idl: Arc<Idl>) -> Self {
        let discriminator = idl.account_discriminator(POLICY_ACCOUNT);
        Self { idl, discriminator }
    }

    pub fn discriminator(&self) -> [u8; DISCRIMINATOR_LEN] {
        self.discriminator
    }

    /// Offset of the gateway pubkey, when every preceding field has a fixed size.
    pub fn gateway_offset(&self) -> Option<usize> {
        self.idl.field_offset(POLICY_ACCOUNT, "gateway")
    }

    pub fn decode(&self, address: Pubkey, data: &[u8]) -> ChainResult<PaymentPolicy> {
        let invalid = |reason: String| ChainError::InvalidAccount {
            address: address.to_string(),
            reason,
        };

        if data.len() < DISCRIMINATOR_LEN || data[..DISCRIMINATOR_LEN] != self.discriminator {
            return Err(invalid("not a payment policy account".to_string()));
        }

        let mut reader = BorshReader::new(&data[DISCRIMINATOR_LEN..]);
        let fields = IdlDecoder::new(&self.idl)
            .decode_defined(POLICY_ACCOUNT, &mut reader)
            .map_err(|e| invalid(e.to_string()))?;

        policy_from_fields(address, fields)
    }
}

/// Lifts the scheduler-relevant fields out of a decoded policy account.
pub fn policy_from_fields(address: Pubkey, fields: Value) -> ChainResult<PaymentPolicy> {
    let invalid = |reason: &str| ChainError::InvalidAccount {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let status = variant(&fields["status"])
        .map(|(name, _)| PolicyStatus::from_variant(name))
        .ok_or_else(|| invalid("missing status"))?;

    let next_payment_due = fields["nextPaymentDue"]
        .as_i64()
        .ok_or_else(|| invalid("missing nextPaymentDue"))?;

    let payment_count = fields["paymentCount"]
        .as_u64()
        .ok_or_else(|| invalid("missing paymentCount"))?;

    let policy_type = match variant(&fields["policyType"]) {
        Some((name, body)) if name.eq_ignore_ascii_case("subscription") => PolicyType::Subscription {
            max_renewals: body["maxRenewals"].as_u64(),
        },
        Some((name, _)) => PolicyType::Other(name.to_string()),
        None => return Err(invalid("missing policyType")),
    };

    Ok(PaymentPolicy {
        address,
        policy_id: fields["policyId"].as_u64().unwrap_or_default(),
        status,
        next_payment_due,
        policy_type,
        payment_count,
        fields,
    })
}

/// Anchor enums decode as `{ "variantName": { ...fields } }`.
fn variant(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}
