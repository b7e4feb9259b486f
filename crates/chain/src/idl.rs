//! Anchor IDL model
//!
//! The program's IDL is the schema this service receives from the program
//! client: event layouts, the payment-policy account layout and the payment
//! instruction's account list. Both the current (0.30+) format and the older
//! inline-field format are accepted.

use crate::error::{ChainError, ChainResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

pub const DISCRIMINATOR_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct Idl {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub instructions: Vec<IdlInstruction>,
    #[serde(default)]
    pub accounts: Vec<IdlAccountDef>,
    #[serde(default)]
    pub events: Vec<IdlEvent>,
    #[serde(default)]
    pub types: Vec<IdlTypeDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlInstruction {
    pub name: String,
    #[serde(default)]
    pub discriminator: Option<Vec<u8>>,
    #[serde(default)]
    pub accounts: Vec<IdlInstructionAccount>,
    #[serde(default)]
    pub args: Vec<IdlField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlInstructionAccount {
    pub name: String,
    #[serde(default, alias = "isMut")]
    pub writable: bool,
    #[serde(default, alias = "isSigner")]
    pub signer: bool,
    #[serde(default, alias = "isOptional")]
    pub optional: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub pda: Option<IdlPda>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlPda {
    pub seeds: Vec<IdlSeed>,
    #[serde(default)]
    pub program: Option<IdlSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IdlSeed {
    Const { value: Vec<u8> },
    Account { path: String },
    Arg { path: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlAccountDef {
    pub name: String,
    #[serde(default)]
    pub discriminator: Option<Vec<u8>>,
    #[serde(default, rename = "type")]
    pub ty: Option<IdlTypeDefTy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlEvent {
    pub name: String,
    #[serde(default)]
    pub discriminator: Option<Vec<u8>>,
    /// Inline fields of the pre-0.30 format
    #[serde(default)]
    pub fields: Option<Vec<IdlField>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlTypeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlTypeDefTy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IdlTypeDefTy {
    Struct {
        #[serde(default)]
        fields: Option<IdlFields>,
    },
    Enum {
        variants: Vec<IdlEnumVariant>,
    },
    Type {
        alias: IdlType,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdlFields {
    Named(Vec<IdlField>),
    Tuple(Vec<IdlType>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdlEnumVariant {
    pub name: String,
    #[serde(default)]
    pub fields: Option<IdlFields>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdlType {
    Primitive(String),
    Option { option: Box<IdlType> },
    COption { coption: Box<IdlType> },
    Vec { vec: Box<IdlType> },
    Array { array: (Box<IdlType>, IdlArrayLen) },
    Defined { defined: IdlDefined },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdlDefined {
    Name(String),
    Named { name: String },
}

impl IdlDefined {
    pub fn name(&self) -> &str {
        match self {
            IdlDefined::Name(name) | IdlDefined::Named { name } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdlArrayLen {
    Value(usize),
    Generic { generic: String },
}

impl Idl {
    pub fn from_json(json: &str) -> ChainResult<Self> {
        serde_json::from_str(json).map_err(|e| ChainError::Idl(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ChainResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChainError::Idl(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn type_def(&self, name: &str) -> Option<&IdlTypeDefTy> {
        self.types
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.ty)
            .or_else(|| {
                self.accounts
                    .iter()
                    .find(|a| a.name == name)
                    .and_then(|a| a.ty.as_ref())
            })
    }

    pub fn account_discriminator(&self, name: &str) -> [u8; DISCRIMINATOR_LEN] {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.discriminator.as_deref())
            .and_then(to_discriminator)
            .unwrap_or_else(|| discriminator("account", name))
    }

    pub fn event_discriminator(event: &IdlEvent) -> [u8; DISCRIMINATOR_LEN] {
        event
            .discriminator
            .as_deref()
            .and_then(to_discriminator)
            .unwrap_or_else(|| discriminator("event", &event.name))
    }

    /// Finds an instruction by name, ignoring snake/camel case differences.
    pub fn instruction(&self, name: &str) -> Option<&IdlInstruction> {
        let wanted = normalize_name(name);
        self.instructions
            .iter()
            .find(|ix| normalize_name(&ix.name) == wanted)
    }

    pub fn instruction_discriminator(ix: &IdlInstruction) -> [u8; DISCRIMINATOR_LEN] {
        ix.discriminator
            .as_deref()
            .and_then(to_discriminator)
            .unwrap_or_else(|| discriminator("global", &to_snake_case(&ix.name)))
    }

    /// Borsh size of a type when it does not depend on the data.
    pub fn fixed_size(&self, ty: &IdlType) -> Option<usize> {
        match ty {
            IdlType::Primitive(name) => match name.as_str() {
                "bool" | "u8" | "i8" => Some(1),
                "u16" | "i16" => Some(2),
                "u32" | "i32" | "f32" => Some(4),
                "u64" | "i64" | "f64" => Some(8),
                "u128" | "i128" => Some(16),
                "u256" | "i256" | "pubkey" | "publicKey" => Some(32),
                _ => None,
            },
            IdlType::Array {
                array: (inner, IdlArrayLen::Value(len)),
            } => self.fixed_size(inner).map(|size| size * len),
            IdlType::Defined { defined } => match self.type_def(defined.name())? {
                IdlTypeDefTy::Struct { fields } => match fields {
                    None => Some(0),
                    Some(IdlFields::Named(fields)) => {
                        fields.iter().map(|f| self.fixed_size(&f.ty)).sum()
                    }
                    Some(IdlFields::Tuple(types)) => {
                        types.iter().map(|t| self.fixed_size(t)).sum()
                    }
                },
                IdlTypeDefTy::Enum { variants } => {
                    let all_unit = variants.iter().all(|v| v.fields.is_none());
                    all_unit.then_some(1)
                }
                IdlTypeDefTy::Type { alias } => self.fixed_size(alias),
            },
            _ => None,
        }
    }

    /// Byte offset of a named field inside an account, discriminator included.
    pub fn field_offset(&self, type_name: &str, field: &str) -> Option<usize> {
        let IdlTypeDefTy::Struct {
            fields: Some(IdlFields::Named(fields)),
        } = self.type_def(type_name)?
        else {
            return None;
        };

        let wanted = normalize_name(field);
        let mut offset = DISCRIMINATOR_LEN;
        for f in fields {
            if normalize_name(&f.name) == wanted {
                return Some(offset);
            }
            offset += self.fixed_size(&f.ty)?;
        }
        None
    }
}

pub fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let hash = Sha256::digest(format!("{}:{}", namespace, name).as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}

fn to_discriminator(bytes: &[u8]) -> Option<[u8; DISCRIMINATOR_LEN]> {
    bytes.try_into().ok()
}

/// Case- and underscore-insensitive key used to match IDL names.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// `next_payment_due` -> `nextPaymentDue`, `Active` -> `active`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.push(first.to_ascii_lowercase());
            } else {
                out.push(first.to_ascii_uppercase());
            }
            out.extend(chars);
        }
    }
    out
}

pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
