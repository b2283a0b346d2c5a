//! Pipeline data model
//!
//! `RawCapture` is the only persisted entity the pipeline reads; everything
//! else here is computed per invocation and discarded once the caller has
//! consumed the outcome.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Staged copy of one external fetch response, pending transformation
///
/// Field aliases accept rows exported straight from the `*_raw_data` tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCapture {
    pub id: i64,
    #[serde(alias = "bar_id")]
    pub tenant_id: i64,
    pub data_type: String,
    /// Fetch window the collector requested, if it was date scoped
    #[serde(default)]
    pub data_date: Option<NaiveDate>,
    #[serde(alias = "created_at")]
    pub captured_at: DateTime<Utc>,
    #[serde(alias = "raw_json")]
    pub source_payload: Value,
    /// Item count as reported by the collector; informational only
    #[serde(default)]
    pub record_count: Option<i64>,
    /// Nullable in the raw tables; null reads as unprocessed
    #[serde(default, deserialize_with = "null_as_false")]
    pub processed: bool,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Outcome of one upsert call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: usize,
    pub attempted_count: usize,
    /// Rows the store reports as affected; below `attempted_count` when
    /// unchanged duplicates were skipped
    pub inserted_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    pub fn succeeded(batch_index: usize, attempted_count: usize, inserted_count: u64) -> Self {
        Self {
            batch_index,
            attempted_count,
            inserted_count,
            error: None,
        }
    }

    pub fn failed(batch_index: usize, attempted_count: usize, error: impl Into<String>) -> Self {
        Self {
            batch_index,
            attempted_count,
            inserted_count: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Orchestrator invocation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub raw_capture_id: i64,
    /// Falls back to the descriptor default when absent
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl InvocationRequest {
    pub fn new(raw_capture_id: i64) -> Self {
        Self {
            raw_capture_id,
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Full result of one orchestrator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionOutcome {
    pub raw_capture_id: i64,
    pub tenant_id: i64,
    pub data_type: String,
    pub total_records: usize,
    /// Records dropped because a later record carried the same key
    #[serde(default)]
    pub duplicate_records: usize,
    pub total_inserted: u64,
    pub batches: Vec<BatchResult>,
    /// Whether this run flipped (or re-confirmed) the capture as processed
    pub marked_processed: bool,
    /// Set when the run short-circuited on an already processed capture
    #[serde(default)]
    pub skipped_already_processed: bool,
    /// Reason the payload yielded no records, when it was malformed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_error: Option<String>,
    pub duration_secs: f64,
}

impl IngestionOutcome {
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchResult> {
        self.batches.iter().filter(|b| !b.is_success())
    }

    /// True when at least one chunk failed and a re-run would add rows
    pub fn is_under_inserted(&self) -> bool {
        self.failed_batches().next().is_some()
    }

    pub fn summary(&self) -> InvocationSummary {
        InvocationSummary::from(self)
    }
}

/// Wire-level result: `{processed_count, inserted_count}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationSummary {
    pub processed_count: usize,
    pub inserted_count: u64,
}

impl From<&IngestionOutcome> for InvocationSummary {
    fn from(outcome: &IngestionOutcome) -> Self {
        Self {
            processed_count: outcome.total_records,
            inserted_count: outcome.total_inserted,
        }
    }
}
