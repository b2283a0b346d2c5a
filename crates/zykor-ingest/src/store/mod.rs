//! Storage collaborators
//!
//! The pipeline talks to two stores: a [`StateStore`] holding raw captures
//! and their processed flag, and a [`TargetStore`] receiving typed rows via
//! keyed upserts. Both are trait objects so the orchestrator can run against
//! PostgreSQL, a PostgREST endpoint or the in-memory store used by tests and
//! file replay.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod rest;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;
pub use rest::RestStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{IngestError, Result};
use crate::models::RawCapture;
use crate::record::{FieldValue, KeyedRecord};

/// Default name of the raw capture table
pub const DEFAULT_RAW_TABLE: &str = "contahub_raw_data";

/// One upsert call: rows for a single table, merged on `key_column`
#[derive(Debug, Clone, Copy)]
pub struct UpsertBatch<'a> {
    pub table: &'a str,
    pub tenant_column: &'a str,
    pub tenant_id: i64,
    pub key_column: &'a str,
    pub records: &'a [KeyedRecord],
}

impl UpsertBatch<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// JSON rows including tenant and key columns
    pub fn rows(&self) -> Vec<Map<String, Value>> {
        self.records
            .iter()
            .map(|r| r.to_row(self.tenant_column, self.tenant_id, self.key_column))
            .collect()
    }

    /// Record columns shared by every row, in declaration order
    ///
    /// Fails when rows disagree on their column set.
    pub fn columns(&self) -> Result<Vec<&str>> {
        let Some(first) = self.records.first() else {
            return Ok(Vec::new());
        };
        let columns: Vec<&str> = first.record.fields().map(|(name, _)| name).collect();
        for keyed in &self.records[1..] {
            let same = keyed.record.len() == columns.len()
                && keyed
                    .record
                    .fields()
                    .zip(&columns)
                    .all(|((name, _), expected)| name == *expected);
            if !same {
                return Err(IngestError::InvalidInput(format!(
                    "rows for {} do not share one column set",
                    self.table
                )));
            }
        }
        Ok(columns)
    }

    /// Values of one record in `columns()` order
    pub fn values<'r>(record: &'r KeyedRecord) -> impl Iterator<Item = &'r FieldValue> {
        record.record.fields().map(|(_, value)| value)
    }
}

/// Destination of normalized rows
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Merge rows on their idempotency key and report the affected count
    ///
    /// Rows whose stored values are unchanged may be excluded from the count.
    async fn upsert(&self, batch: UpsertBatch<'_>) -> Result<u64>;
}

/// Holder of raw captures and their processing state
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, raw_capture_id: i64) -> Result<Option<RawCapture>>;

    /// Flip `processed` to true; an existing `processed_at` is kept
    async fn mark_processed(&self, raw_capture_id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Reject identifiers that cannot be spliced into SQL or URLs verbatim
pub fn validate_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(IngestError::InvalidInput(format!("invalid identifier '{name}'")))
    }
}
