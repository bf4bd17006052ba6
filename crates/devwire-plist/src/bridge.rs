//! Conversion between [`Value`] and the `plist` crate's object model.
//!
//! Outbound values become a [`plist::Value`] tree handed to the crate's
//! writers. Inbound documents are consumed as a [`plist::stream`] event
//! sequence so nesting depth and total expansion can be bounded while the
//! tree is built.

use plist::stream::{Event, OwnedEvent};

use crate::error::{PlistError, Result};
use crate::value::{Dictionary, Value};
use crate::{Format, MAX_DEPTH};

/// Decoded values allowed per input byte.
///
/// A binary document may reference one object from many places and every
/// reference is expanded again on decode. Each emitted value normally costs
/// at least one reference byte, so the budget is a small multiple of the
/// input length.
pub const MAX_VALUES_PER_BYTE: usize = 4;

pub(crate) fn to_plist(value: &Value) -> Result<plist::Value> {
    match value {
        Value::Text(text) => Ok(plist::Value::String(text.clone())),
        Value::Bytes(bytes) => Ok(plist::Value::Data(bytes.clone())),
        Value::Dictionary(dict) => {
            let mut out = plist::Dictionary::new();
            for (key, value) in dict.iter() {
                out.insert(key.to_string(), to_plist(value)?);
            }
            Ok(plist::Value::Dictionary(out))
        }
        other => Err(PlistError::UnsupportedValue { kind: other.kind() }),
    }
}

enum Open {
    Array(Vec<Value>),
    Dictionary {
        dict: Dictionary,
        key: Option<String>,
    },
}

/// Build one value from a reader's event stream.
pub(crate) fn from_events<I>(events: I, format: Format, budget: usize) -> Result<Value>
where
    I: IntoIterator<Item = std::result::Result<OwnedEvent, plist::Error>>,
{
    let mut builder = Builder {
        format,
        stack: Vec::new(),
        root: None,
        remaining: budget,
    };
    for event in events {
        let event = event.map_err(|source| PlistError::Codec { format, source })?;
        builder.push(event)?;
    }
    builder.finish()
}

struct Builder {
    format: Format,
    stack: Vec<Open>,
    root: Option<Value>,
    remaining: usize,
}

impl Builder {
    fn push(&mut self, event: OwnedEvent) -> Result<()> {
        let format = self.format;
        self.remaining = self
            .remaining
            .checked_sub(1)
            .ok_or_else(|| PlistError::format(format, "document expands beyond its size budget"))?;

        match event {
            Event::StartArray(_) => self.open(Open::Array(Vec::new())),
            Event::StartDictionary(_) => self.open(Open::Dictionary {
                dict: Dictionary::new(),
                key: None,
            }),
            Event::EndCollection => self.close(),
            Event::String(text) => {
                if let Some(Open::Dictionary { key: key @ None, .. }) = self.stack.last_mut() {
                    *key = Some(text.into_owned());
                    return Ok(());
                }
                self.attach(Value::Text(text.into_owned()))
            }
            Event::Data(bytes) => self.attach(Value::Bytes(bytes.into_owned())),
            Event::Boolean(b) => self.attach(Value::Boolean(b)),
            Event::Real(r) => self.attach(Value::Real(r)),
            Event::Integer(n) => {
                // Unsigned values above i64::MAX keep their bit pattern.
                let n = n
                    .as_signed()
                    .or_else(|| n.as_unsigned().map(|u| u as i64))
                    .ok_or_else(|| PlistError::format(format, "integer out of range"))?;
                self.attach(Value::Integer(n))
            }
            Event::Date(_) => Err(self.error("date values are not supported")),
            Event::Uid(_) => Err(self.error("uid values are not supported")),
            _ => Err(self.error("unsupported value")),
        }
    }

    fn open(&mut self, container: Open) -> Result<()> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH}")));
        }
        if let Some(Open::Dictionary { key: None, .. }) = self.stack.last() {
            return Err(self.error("dictionary key must be text"));
        }
        self.stack.push(container);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let value = match self.stack.pop() {
            Some(Open::Array(items)) => Value::Array(items),
            Some(Open::Dictionary { dict, key: None }) => Value::Dictionary(dict),
            Some(Open::Dictionary { key: Some(key), .. }) => {
                return Err(self.error(format!("key {key:?} has no value")));
            }
            None => return Err(self.error("unbalanced end of collection")),
        };
        self.attach(value)
    }

    fn attach(&mut self, value: Value) -> Result<()> {
        let format = self.format;
        match self.stack.last_mut() {
            Some(Open::Array(items)) => items.push(value),
            Some(Open::Dictionary { dict, key }) => match key.take() {
                Some(key) => {
                    dict.insert(key, value);
                }
                None => return Err(PlistError::format(format, "dictionary key must be text")),
            },
            None if self.root.is_some() => {
                return Err(PlistError::format(format, "more than one top-level value"));
            }
            None => self.root = Some(value),
        }
        Ok(())
    }

    fn finish(self) -> Result<Value> {
        if !self.stack.is_empty() {
            return Err(self.error("unterminated collection"));
        }
        self.root
            .ok_or_else(|| PlistError::format(self.format, "document holds no value"))
    }

    fn error(&self, reason: impl Into<String>) -> PlistError {
        PlistError::format(self.format, reason)
    }
}
