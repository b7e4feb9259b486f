//! Program event schema

use crate::decode::{BorshReader, IdlDecoder};
use crate::error::{ChainError, ChainResult};
use crate::idl::{Idl, IdlFields, DISCRIMINATOR_LEN};
use serde_json::Value;
use std::sync::Arc;

/// An event payload recognised by the schema, before it is placed in a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub data: Value,
}

/// Decodes `Program data:` payloads emitted by the monitored program.
pub trait EventSchema: Send + Sync {
    /// Every event type the program can emit, in declaration order.
    fn event_names(&self) -> Vec<String>;

    /// `Ok(None)` when the payload does not belong to any declared event.
    fn decode_event(&self, payload: &[u8]) -> ChainResult<Option<RawEvent>>;
}

struct EventEntry {
    name: String,
    discriminator: [u8; DISCRIMINATOR_LEN],
    inline_fields: Option<IdlFields>,
}

/// Event schema backed by the program's Anchor IDL.
pub struct IdlEventSchema {
    idl: Arc<Idl>,
    events: Vec<EventEntry>,
}

impl IdlEventSchema {
    pub fn new(idl: Arc<Idl>) -> Self {
        let events = idl
            .events
            .iter()
            .map(|event| EventEntry {
                name: event.name.clone(),
                discriminator: Idl::event_discriminator(event),
                inline_fields: event.fields.clone().map(IdlFields::Named),
            })
            .collect();
        Self { idl, events }
    }
}

impl EventSchema for IdlEventSchema {
    fn event_names(&self) -> Vec<String> {
        self.events.iter().map(|e| e.name.clone()).collect()
    }

    fn decode_event(&self, payload: &[u8]) -> ChainResult<Option<RawEvent>> {
        if payload.len() < DISCRIMINATOR_LEN {
            return Ok(None);
        }
        let (disc, body) = payload.split_at(DISCRIMINATOR_LEN);
        let Some(entry) = self.events.iter().find(|e| e.discriminator[..] == *disc) else {
            return Ok(None);
        };

        let decoder = IdlDecoder::new(&self.idl);
        let mut reader = BorshReader::new(body);
        let data = match &entry.inline_fields {
            Some(fields) => decoder.decode_fields(fields, &mut reader),
            None => decoder.decode_defined(&entry.name, &mut reader),
        }
        .map_err(|e| ChainError::Decode(format!("event {}: {}", entry.name, e)))?;

        Ok(Some(RawEvent {
            name: entry.name.clone(),
            data,
        }))
    }
}
