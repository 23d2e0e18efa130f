//! Record-to-row translation.
//!
//! A [`RecordMapper`] decides which row a record lands in and which cells and
//! counters it touches. Mappers are pure: no I/O, no shared mutable state, so
//! one instance can serve many concurrent records.
//!
//! [`FieldMapper`] is the stock implementation: one field supplies the row key,
//! a list of fields become cells in a single column family, and another list
//! becomes counters.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::columns::ColumnList;
use crate::error::{Result, SinkError};
use crate::record::Record;

/// Translates a record into a row key and the mutations for that row.
pub trait RecordMapper: Send + Sync {
    /// Row key for the record. Must return identical bytes for identical
    /// records; fails only when the record is malformed.
    fn row_key(&self, record: &Record) -> Result<Bytes>;

    /// Cells and counters to apply to the row. May be empty.
    fn columns(&self, record: &Record) -> Result<ColumnList>;
}

/// Field-driven mapper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapper {
    row_key_field: String,
    column_family: String,
    #[serde(default)]
    column_fields: Vec<String>,
    #[serde(default)]
    counter_fields: Vec<String>,
}

impl FieldMapper {
    /// Create a mapper keyed on `row_key_field`, writing into `column_family`.
    pub fn new(row_key_field: impl Into<String>, column_family: impl Into<String>) -> Result<Self> {
        let mapper = Self {
            row_key_field: row_key_field.into(),
            column_family: column_family.into(),
            column_fields: Vec::new(),
            counter_fields: Vec::new(),
        };
        mapper.validate()?;
        Ok(mapper)
    }

    /// Fields written as plain cells, qualifier = field name.
    pub fn with_column_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Fields applied as counter increments, qualifier = field name.
    pub fn with_counter_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counter_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Check the settings a deserialized mapper cannot enforce by itself.
    pub fn validate(&self) -> Result<()> {
        if self.row_key_field.trim().is_empty() {
            return Err(SinkError::Config("row key field must not be empty".to_string()));
        }
        if self.column_family.trim().is_empty() {
            return Err(SinkError::Config("column family must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn row_key_field(&self) -> &str {
        &self.row_key_field
    }

    pub fn column_family(&self) -> &str {
        &self.column_family
    }
}

impl RecordMapper for FieldMapper {
    fn row_key(&self, record: &Record) -> Result<Bytes> {
        let value = record.require(&self.row_key_field)?;
        encode_value(value).map_err(|e| {
            SinkError::Mapping(format!("row key field '{}': {}", self.row_key_field, e))
        })
    }

    fn columns(&self, record: &Record) -> Result<ColumnList> {
        let family = Bytes::from(self.column_family.clone());
        let mut cols = ColumnList::new();

        for field in &self.column_fields {
            if let Some(value) = record.get(field) {
                let encoded = encode_value(value)
                    .map_err(|e| SinkError::Mapping(format!("column field '{}': {}", field, e)))?;
                cols.add_column(family.clone(), field.clone(), encoded);
            }
        }

        for field in &self.counter_fields {
            if let Some(value) = record.get(field) {
                let delta = value_as_i64(value)
                    .map_err(|e| SinkError::Mapping(format!("counter field '{}': {}", field, e)))?;
                cols.add_counter(family.clone(), field.clone(), delta);
            }
        }

        Ok(cols)
    }
}

/// Encode a field value as cell bytes.
///
/// Strings are UTF-8, integers are 8-byte big-endian, floats are the
/// big-endian IEEE 754 bits, booleans are a single `0x00`/`0xFF` byte, arrays
/// and objects are compact JSON. Null has no encoding.
pub fn encode_value(value: &Value) -> Result<Bytes> {
    match value {
        Value::Null => Err(SinkError::Mapping("null has no byte encoding".to_string())),
        Value::Bool(b) => Ok(Bytes::from(vec![if *b { 0xFF } else { 0x00 }])),
        Value::String(s) => Ok(Bytes::from(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Bytes::copy_from_slice(&i.to_be_bytes()))
            } else if let Some(u) = n.as_u64() {
                // Above i64::MAX; keep the full unsigned width.
                Ok(Bytes::copy_from_slice(&u.to_be_bytes()))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Ok(Bytes::copy_from_slice(&f.to_bits().to_be_bytes()))
            }
        }
        Value::Array(_) | Value::Object(_) => Ok(Bytes::from(value.to_string())),
    }
}

/// Interpret a field value as a counter delta.
pub fn value_as_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| SinkError::Mapping(format!("{} is not a 64-bit integer", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| SinkError::Mapping(format!("'{}' is not an integer: {}", s, e))),
        other => Err(SinkError::Mapping(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}
