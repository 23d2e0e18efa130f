//! Record type delivered by the upstream pipeline.
//!
//! A [`Record`] is one tuple: a delivery id the pipeline uses to match the
//! ack/fail signal back to its own bookkeeping, plus a set of named fields.
//! The adapter never mutates a record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SinkError};

/// Unique delivery handle of a record, assigned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryId(pub u64);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single input tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: DeliveryId,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(id: u64) -> Self {
        Self {
            id: DeliveryId(id),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, replacing any previous value under the same name.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build a record from a JSON object, one field per top-level key.
    pub fn from_json(id: u64, json: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(json)
            .map_err(|e| SinkError::Mapping(format!("invalid JSON record: {}", e)))?;

        match parsed {
            Value::Object(map) => Ok(Self {
                id: DeliveryId(id),
                fields: map.into_iter().collect(),
            }),
            _ => Err(SinkError::Mapping(
                "record value must be a JSON object".to_string(),
            )),
        }
    }

    pub fn id(&self) -> DeliveryId {
        self.id
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Look up a field that must be present.
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| {
            SinkError::Mapping(format!("record {} has no field '{}'", self.id, name))
        })
    }

    /// Iterate fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
