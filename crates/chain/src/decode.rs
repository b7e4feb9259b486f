//! IDL-driven Borsh decoding into JSON values

use crate::error::{ChainError, ChainResult};
use crate::idl::{to_camel_case, Idl, IdlArrayLen, IdlFields, IdlType, IdlTypeDefTy};
use base64::Engine;
use borsh::BorshDeserialize;
use serde_json::{Map, Number, Value};
use solana_sdk::pubkey::Pubkey;

/// Cursor over a Borsh-encoded buffer.
pub struct BorshReader<'a> {
    data: &'a [u8],
    len: usize,
}

impl<'a> BorshReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, len: data.len() }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn offset(&self) -> usize {
        self.len - self.data.len()
    }

    /// Deserialize the next value, advancing past it.
    pub fn read<T: BorshDeserialize>(&mut self) -> ChainResult<T> {
        let offset = self.offset();
        T::deserialize(&mut self.data).map_err(|e| {
            ChainError::Decode(format!(
                "failed to read {} at offset {}: {}",
                std::any::type_name::<T>(),
                offset,
                e
            ))
        })
    }

    /// Reads a `u32` length prefix that must fit in the rest of the buffer.
    fn read_len(&mut self) -> ChainResult<usize> {
        let len = self.read::<u32>()? as usize;
        // every element takes at least one byte
        if len > self.remaining() {
            return Err(ChainError::Decode(format!("length prefix {} exceeds remaining data", len)));
        }
        Ok(len)
    }
}

/// Decodes values laid out according to the types declared in an IDL.
pub struct IdlDecoder<'i> {
    idl: &'i Idl,
}

impl<'i> IdlDecoder<'i> {
    pub fn new(idl: &'i Idl) -> Self {
        Self { idl }
    }

    /// Decode a named struct type (an event or an account body).
    pub fn decode_defined(&self, name: &str, reader: &mut BorshReader<'_>) -> ChainResult<Value> {
        let def = self
            .idl
            .type_def(name)
            .ok_or_else(|| ChainError::Idl(format!("type `{}` not declared", name)))?;
        self.decode_type_def(def, reader)
    }

    pub fn decode_fields(&self, fields: &IdlFields, reader: &mut BorshReader<'_>) -> ChainResult<Value> {
        match fields {
            IdlFields::Named(fields) => {
                let mut map = Map::new();
                for field in fields {
                    map.insert(to_camel_case(&field.name), self.decode(&field.ty, reader)?);
                }
                Ok(Value::Object(map))
            }
            IdlFields::Tuple(types) => types
                .iter()
                .map(|ty| self.decode(ty, reader))
                .collect::<ChainResult<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn decode_type_def(&self, def: &IdlTypeDefTy, reader: &mut BorshReader<'_>) -> ChainResult<Value> {
        match def {
            IdlTypeDefTy::Struct { fields } => match fields {
                Some(fields) => self.decode_fields(fields, reader),
                None => Ok(Value::Object(Map::new())),
            },
            IdlTypeDefTy::Enum { variants } => {
                let tag = reader.read::<u8>()? as usize;
                let variant = variants.get(tag).ok_or_else(|| {
                    ChainError::Decode(format!("enum variant index {} out of range", tag))
                })?;
                let body = match &variant.fields {
                    Some(fields) => self.decode_fields(fields, reader)?,
                    None => Value::Object(Map::new()),
                };
                let mut map = Map::new();
                map.insert(to_camel_case(&variant.name), body);
                Ok(Value::Object(map))
            }
            IdlTypeDefTy::Type { alias } => self.decode(alias, reader),
        }
    }

    pub fn decode(&self, ty: &IdlType, reader: &mut BorshReader<'_>) -> ChainResult<Value> {
        match ty {
            IdlType::Primitive(name) => self.decode_primitive(name, reader),
            IdlType::Option { option } => match reader.read::<u8>()? {
                0 => Ok(Value::Null),
                _ => self.decode(option, reader),
            },
            IdlType::COption { coption } => match reader.read::<u32>()? {
                0 => Ok(Value::Null),
                _ => self.decode(coption, reader),
            },
            IdlType::Vec { vec } => {
                let len = reader.read_len()?;
                (0..len)
                    .map(|_| self.decode(vec, reader))
                    .collect::<ChainResult<Vec<_>>>()
                    .map(Value::Array)
            }
            IdlType::Array { array: (inner, len) } => {
                let len = match len {
                    IdlArrayLen::Value(len) => *len,
                    IdlArrayLen::Generic { generic } => {
                        return Err(ChainError::Idl(format!("generic array length `{}` unsupported", generic)))
                    }
                };
                (0..len)
                    .map(|_| self.decode(inner, reader))
                    .collect::<ChainResult<Vec<_>>>()
                    .map(Value::Array)
            }
            IdlType::Defined { defined } => self.decode_defined(defined.name(), reader),
        }
    }

    fn decode_primitive(&self, name: &str, reader: &mut BorshReader<'_>) -> ChainResult<Value> {
        let value = match name {
            "bool" => Value::Bool(reader.read::<bool>()?),
            "u8" => Value::from(reader.read::<u8>()?),
            "i8" => Value::from(reader.read::<i8>()?),
            "u16" => Value::from(reader.read::<u16>()?),
            "i16" => Value::from(reader.read::<i16>()?),
            "u32" => Value::from(reader.read::<u32>()?),
            "i32" => Value::from(reader.read::<i32>()?),
            "u64" => Value::from(reader.read::<u64>()?),
            "i64" => Value::from(reader.read::<i64>()?),
            // wider than JSON numbers can carry
            "u128" => Value::String(reader.read::<u128>()?.to_string()),
            "i128" => Value::String(reader.read::<i128>()?.to_string()),
            "f32" => float(reader.read::<f32>()? as f64),
            "f64" => float(reader.read::<f64>()?),
            "pubkey" | "publicKey" => {
                Value::String(Pubkey::new_from_array(reader.read::<[u8; 32]>()?).to_string())
            }
            "string" => Value::String(reader.read::<String>()?),
            "bytes" => {
                let bytes = reader.read::<Vec<u8>>()?;
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            other => return Err(ChainError::Idl(format!("unsupported IDL type `{}`", other))),
        };
        Ok(value)
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsh::BorshSerialize;
    use serde_json::json;

    fn idl() -> Idl {
        Idl::from_json(
            r#"{
                "types": [
                    {
                        "name": "Sample",
                        "type": {
                            "kind": "struct",
                            "fields": [
                                { "name": "amount", "type": "u64" },
                                { "name": "max_renewals", "type": { "option": "u32" } },
                                { "name": "label", "type": "string" },
                                { "name": "kind", "type": { "defined": { "name": "Kind" } } },
                                { "name": "big", "type": "u128" }
                            ]
                        }
                    },
                    {
                        "name": "Kind",
                        "type": {
                            "kind": "enum",
                            "variants": [
                                { "name": "Plain" },
                                { "name": "Subscription", "fields": [{ "name": "max_renewals", "type": { "option": "u32" } }] }
                            ]
                        }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn encode_sample() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&500u64.to_le_bytes());
        data.push(0);
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"pro");
        data.push(1);
        data.push(1);
        data.extend_from_slice(&12u32.to_le_bytes());
        data.extend_from_slice(&u128::MAX.to_le_bytes());
        data
    }

    #[test]
    fn test_decodes_struct_with_enum_payload() {
        let idl = idl();
        let decoder = IdlDecoder::new(&idl);
        let data = encode_sample();
        let mut reader = BorshReader::new(&data);

        let value = decoder.decode_defined("Sample", &mut reader).unwrap();

        assert_eq!(
            value,
            json!({
                "amount": 500,
                "maxRenewals": null,
                "label": "pro",
                "kind": { "subscription": { "maxRenewals": 12 } },
                "big": u128::MAX.to_string(),
            })
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_data_is_an_error() {
        let idl = idl();
        let decoder = IdlDecoder::new(&idl);
        let data = encode_sample();
        let mut reader = BorshReader::new(&data[..10]);

        assert!(decoder.decode_defined("Sample", &mut reader).is_err());
    }

    #[derive(BorshSerialize)]
    enum KindMirror {
        Plain,
        #[allow(dead_code)]
        Subscription { max_renewals: Option<u32> },
    }

    #[derive(BorshSerialize)]
    struct SampleMirror {
        amount: u64,
        max_renewals: Option<u32>,
        label: String,
        kind: KindMirror,
        big: u128,
    }

    #[test]
    fn test_matches_borsh_derived_layout() {
        let idl = idl();
        let decoder = IdlDecoder::new(&idl);
        let data = SampleMirror {
            amount: 7,
            max_renewals: Some(3),
            label: "basic".to_string(),
            kind: KindMirror::Plain,
            big: 1,
        }
        .try_to_vec()
        .unwrap();
        let mut reader = BorshReader::new(&data);

        let value = decoder.decode_defined("Sample", &mut reader).unwrap();

        assert_eq!(
            value,
            json!({
                "amount": 7,
                "maxRenewals": 3,
                "label": "basic",
                "kind": { "plain": {} },
                "big": "1",
            })
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_invalid_utf8_string_is_an_error() {
        let idl = idl();
        let decoder = IdlDecoder::new(&idl);
        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_le_bytes());
        data.push(0);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0xff, 0xfe]);
        data.push(0);
        data.extend_from_slice(&0u128.to_le_bytes());
        let mut reader = BorshReader::new(&data);

        assert!(matches!(
            decoder.decode_defined("Sample", &mut reader),
            Err(ChainError::Decode(_))
        ));
    }
}
