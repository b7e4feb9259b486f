//! Payment instruction resolution
//!
//! The program's `execute_payment` instruction is built from its IDL entry.
//! Accounts are resolved by name against the policy being paid, the gateway
//! signer, fixed addresses and PDA seeds.

use crate::error::{ChainError, ChainResult};
use crate::idl::{normalize_name, Idl, IdlInstructionAccount, IdlSeed};
use crate::types::PaymentPolicy;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;

pub const EXECUTE_PAYMENT: &str = "execute_payment";

pub fn build_execute_payment(
    idl: &Idl,
    program_id: &Pubkey,
    policy: &PaymentPolicy,
    gateway: &Pubkey,
) -> ChainResult<Instruction> {
    let ix = idl
        .instruction(EXECUTE_PAYMENT)
        .ok_or_else(|| ChainError::Idl(format!("instruction `{}` not declared", EXECUTE_PAYMENT)))?;
    if !ix.args.is_empty() {
        return Err(ChainError::Idl(format!(
            "`{}` takes {} arguments; only argument-free payment instructions are supported",
            EXECUTE_PAYMENT,
            ix.args.len()
        )));
    }

    let mut resolved: HashMap<String, Pubkey> = HashMap::new();
    // PDA seeds may reference accounts declared later, so resolve until a pass makes no progress
    loop {
        let mut progressed = false;
        for account in &ix.accounts {
            let key = normalize_name(&account.name);
            if resolved.contains_key(&key) {
                continue;
            }
            if let Some(pubkey) = resolve_account(account, program_id, policy, gateway, &resolved)? {
                resolved.insert(key, pubkey);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let mut metas = Vec::with_capacity(ix.accounts.len());
    for account in &ix.accounts {
        let pubkey = match resolved.get(&normalize_name(&account.name)) {
            Some(pubkey) => *pubkey,
            // Anchor encodes an absent optional account as the program id
            None if account.optional => *program_id,
            None => return Err(ChainError::UnresolvedAccount(account.name.clone())),
        };
        metas.push(if account.writable {
            AccountMeta::new(pubkey, account.signer)
        } else {
            AccountMeta::new_readonly(pubkey, account.signer)
        });
    }

    Ok(Instruction {
        program_id: *program_id,
        accounts: metas,
        data: Idl::instruction_discriminator(ix).to_vec(),
    })
}

fn resolve_account(
    account: &IdlInstructionAccount,
    program_id: &Pubkey,
    policy: &PaymentPolicy,
    gateway: &Pubkey,
    resolved: &HashMap<String, Pubkey>,
) -> ChainResult<Option<Pubkey>> {
    if let Some(address) = &account.address {
        return parse_pubkey(address).map(Some);
    }

    let key = normalize_name(&account.name);
    if key == "paymentpolicy" || key == "policy" {
        return Ok(Some(policy.address));
    }
    if account.signer {
        return Ok(Some(*gateway));
    }
    if let Some(pubkey) = policy_field(policy, &key) {
        return Ok(Some(pubkey));
    }

    let Some(pda) = &account.pda else {
        return Ok(None);
    };

    let mut seeds: Vec<Vec<u8>> = Vec::with_capacity(pda.seeds.len());
    for seed in &pda.seeds {
        match seed_bytes(seed, policy, resolved) {
            Some(bytes) => seeds.push(bytes),
            None => return Ok(None),
        }
    }
    let owner = match &pda.program {
        None => *program_id,
        Some(seed) => match seed_bytes(seed, policy, resolved) {
            Some(bytes) => Pubkey::try_from(bytes.as_slice())
                .map_err(|_| ChainError::Idl(format!("invalid PDA program for `{}`", account.name)))?,
            None => return Ok(None),
        },
    };

    let seed_refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
    let (address, _bump) = Pubkey::find_program_address(&seed_refs, &owner);
    Ok(Some(address))
}

fn seed_bytes(
    seed: &IdlSeed,
    policy: &PaymentPolicy,
    resolved: &HashMap<String, Pubkey>,
) -> Option<Vec<u8>> {
    match seed {
        IdlSeed::Const { value } => Some(value.clone()),
        IdlSeed::Account { path } => {
            // `policy.field` paths read from the decoded policy account
            let name = path.rsplit('.').next().unwrap_or(path);
            let key = normalize_name(name);
            resolved
                .get(&normalize_name(path))
                .copied()
                .or_else(|| policy_field(policy, &key))
                .map(|pubkey| pubkey.to_bytes().to_vec())
        }
        IdlSeed::Arg { .. } => None,
    }
}

/// A pubkey-valued field of the decoded policy whose name matches `key`.
fn policy_field(policy: &PaymentPolicy, key: &str) -> Option<Pubkey> {
    policy
        .fields
        .as_object()?
        .iter()
        .find(|(name, _)| normalize_name(name) == key)
        .and_then(|(_, value)| value.as_str())
        .and_then(|s| Pubkey::from_str(s).ok())
}

fn parse_pubkey(s: &str) -> ChainResult<Pubkey> {
    Pubkey::from_str(s).map_err(|e| ChainError::Idl(format!("invalid address `{}`: {}", s, e)))
}
