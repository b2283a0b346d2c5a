//! Normalized records produced by the transformer

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::keys::IdempotencyKey;

/// Wire format for dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Wire format for timestamps (timezone offset already stripped)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A typed, already-defaulted column value
///
/// Numbers, text and booleans are never null; dates, timestamps and JSON
/// passthrough columns are.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
    Json(Option<Value>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            FieldValue::Date(None) | FieldValue::Timestamp(None) | FieldValue::Json(None)
        )
    }

    /// Stable textual form used by natural-key composites
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Date(d) => d.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default(),
            FieldValue::Timestamp(t) => t
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            FieldValue::Json(v) => v.as_ref().map(Value::to_string).unwrap_or_default(),
        }
    }

    /// JSON form sent to stores and hashed by content keys
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Date(None) | FieldValue::Timestamp(None) | FieldValue::Json(None) => {
                Value::Null
            },
            FieldValue::Date(Some(_)) | FieldValue::Timestamp(Some(_)) => {
                Value::String(self.canonical())
            },
            FieldValue::Json(Some(v)) => v.clone(),
        }
    }
}

/// One logical row from a raw capture, columns in descriptor order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    source_index: usize,
    fields: Vec<(String, FieldValue)>,
}

impl NormalizedRecord {
    /// `source_index` is the zero-based position of the item in the payload list
    pub fn new(source_index: usize) -> Self {
        Self {
            source_index,
            fields: Vec::new(),
        }
    }

    pub fn with_capacity(source_index: usize, capacity: usize) -> Self {
        Self {
            source_index,
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    /// Set a column, replacing any earlier value under the same name
    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) {
        let column = column.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A record paired with its derived idempotency key, ready to write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedRecord {
    pub key: IdempotencyKey,
    pub record: NormalizedRecord,
}

impl KeyedRecord {
    pub fn new(key: IdempotencyKey, record: NormalizedRecord) -> Self {
        Self { key, record }
    }

    /// Flatten into a JSON row including tenant and key columns
    pub fn to_row(&self, tenant_column: &str, tenant_id: i64, key_column: &str) -> Map<String, Value> {
        let mut row = Map::with_capacity(self.record.len() + 2);
        for (column, value) in self.record.fields() {
            row.insert(column.to_string(), value.to_json());
        }
        row.insert(tenant_column.to_string(), Value::from(tenant_id));
        row.insert(key_column.to_string(), Value::String(self.key.as_str().to_string()));
        row
    }
}
