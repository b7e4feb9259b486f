//! IDL loading and account/event decoding tests

use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tributary_chain::idl::discriminator;
use tributary_chain::policy::PolicyDecoder;
use tributary_chain::{EventSchema, Idl, IdlEventSchema, PolicyStatus, PolicyType};

const IDL: &str = r#"{
    "address": "TRibg8W8zmPHQqWtyAD1rEBRXEdyU13Mu6qX1Sg42tJ",
    "accounts": [{ "name": "PaymentPolicy" }],
    "events": [{ "name": "PaymentExecuted" }],
    "types": [
        {
            "name": "PaymentPolicy",
            "type": { "kind": "struct", "fields": [
                { "name": "user_payment", "type": "pubkey" },
                { "name": "recipient", "type": "pubkey" },
                { "name": "gateway", "type": "pubkey" },
                { "name": "policy_type", "type": { "defined": { "name": "PolicyType" } } },
                { "name": "status", "type": { "defined": { "name": "PaymentStatus" } } },
                { "name": "total_paid", "type": "u64" },
                { "name": "payment_count", "type": "u32" },
                { "name": "next_payment_due", "type": "i64" },
                { "name": "policy_id", "type": "u32" }
            ] }
        },
        {
            "name": "PolicyType",
            "type": { "kind": "enum", "variants": [
                { "name": "Subscription", "fields": [
                    { "name": "amount", "type": "u64" },
                    { "name": "max_renewals", "type": { "option": "u32" } }
                ] }
            ] }
        },
        {
            "name": "PaymentStatus",
            "type": { "kind": "enum", "variants": [
                { "name": "Active" }, { "name": "Paused" }, { "name": "Cancelled" }
            ] }
        },
        {
            "name": "PaymentExecuted",
            "type": { "kind": "struct", "fields": [
                { "name": "payment_policy", "type": "pubkey" },
                { "name": "amount", "type": "u64" }
            ] }
        }
    ]
}"#;

fn load_idl() -> Idl {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tributary.json");
    fs::write(&path, IDL).unwrap();
    Idl::from_file(&path).unwrap()
}

#[test]
fn test_decodes_policy_account_from_idl_layout() {
    let idl = Arc::new(load_idl());
    let decoder = PolicyDecoder::new(idl);
    let gateway = Pubkey::new_unique();

    let mut data = discriminator("account", "PaymentPolicy").to_vec();
    data.extend_from_slice(Pubkey::new_unique().as_ref());
    data.extend_from_slice(Pubkey::new_unique().as_ref());
    data.extend_from_slice(gateway.as_ref());
    data.push(0); // Subscription
    data.extend_from_slice(&1_000u64.to_le_bytes());
    data.push(1);
    data.extend_from_slice(&12u32.to_le_bytes());
    data.push(0); // Active
    data.extend_from_slice(&3_000u64.to_le_bytes());
    data.extend_from_slice(&3u32.to_le_bytes());
    data.extend_from_slice(&1_700_000_000i64.to_le_bytes());
    data.extend_from_slice(&9u32.to_le_bytes());

    let address = Pubkey::new_unique();
    let policy = decoder.decode(address, &data).unwrap();

    assert_eq!(policy.address, address);
    assert_eq!(policy.policy_id, 9);
    assert_eq!(policy.status, PolicyStatus::Active);
    assert_eq!(policy.next_payment_due, 1_700_000_000);
    assert_eq!(policy.payment_count, 3);
    assert_eq!(policy.policy_type, PolicyType::Subscription { max_renewals: Some(12) });
    assert_eq!(policy.fields["gateway"], json!(gateway.to_string()));
    assert_eq!(decoder.gateway_offset(), Some(8 + 32 + 32));
}

#[test]
fn test_event_schema_from_idl() {
    let schema = IdlEventSchema::new(Arc::new(load_idl()));
    assert_eq!(schema.event_names(), vec!["PaymentExecuted".to_string()]);

    let policy = Pubkey::new_unique();
    let mut payload = discriminator("event", "PaymentExecuted").to_vec();
    payload.extend_from_slice(policy.as_ref());
    payload.extend_from_slice(&250u64.to_le_bytes());

    let event = schema.decode_event(&payload).unwrap().unwrap();
    assert_eq!(event.name, "PaymentExecuted");
    assert_eq!(event.data, json!({ "paymentPolicy": policy.to_string(), "amount": 250 }));

    // matching discriminator with a truncated body is a decode error, not a silent skip
    assert!(schema.decode_event(&payload[..20]).is_err());
}
