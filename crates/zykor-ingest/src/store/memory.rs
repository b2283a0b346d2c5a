//! In-memory store
//!
//! Implements both store traits plus the capture sink over plain maps. It
//! backs `zykor-ingest replay` and the test suite, and can be told to fail
//! chosen upsert calls so partial-failure runs can be reproduced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::{StateStore, TargetStore, UpsertBatch};
use crate::capture::{CaptureSink, NewRawCapture};
use crate::error::{IngestError, Result};
use crate::models::RawCapture;

type Row = Map<String, Value>;

#[derive(Debug, Default)]
struct Inner {
    captures: BTreeMap<i64, RawCapture>,
    /// table -> idempotency key -> row
    tables: HashMap<String, BTreeMap<String, Row>>,
    upsert_sizes: Vec<usize>,
    failing_upserts: HashSet<usize>,
    fail_mark_processed: bool,
    write_ceiling: Option<usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject upserts larger than `ceiling` rows
    pub fn with_write_ceiling(self, ceiling: usize) -> Self {
        self.lock().write_ceiling = Some(ceiling);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_capture(&self, capture: RawCapture) {
        self.lock().captures.insert(capture.id, capture);
    }

    pub fn capture(&self, raw_capture_id: i64) -> Option<RawCapture> {
        self.lock().captures.get(&raw_capture_id).cloned()
    }

    /// Make upsert calls fail, counted from the next call (0 = next call)
    pub fn fail_upserts(&self, calls: impl IntoIterator<Item = usize>) {
        let mut inner = self.lock();
        let offset = inner.upsert_sizes.len();
        inner.failing_upserts = calls.into_iter().map(|c| c + offset).collect();
    }

    pub fn fail_mark_processed(&self, fail: bool) {
        self.lock().fail_mark_processed = fail;
    }

    /// Row count of every upsert call received so far, failed ones included
    pub fn upsert_sizes(&self) -> Vec<usize> {
        self.lock().upsert_sizes.clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl TargetStore for InMemoryStore {
    async fn upsert(&self, batch: UpsertBatch<'_>) -> Result<u64> {
        let rows = batch.rows();
        let mut inner = self.lock();
        let call = inner.upsert_sizes.len();
        inner.upsert_sizes.push(rows.len());

        if inner.failing_upserts.remove(&call) {
            return Err(IngestError::StoreMessage(format!(
                "injected failure on upsert call {call}"
            )));
        }
        if let Some(ceiling) = inner.write_ceiling {
            if rows.len() > ceiling {
                return Err(IngestError::StoreMessage(format!(
                    "{} rows exceed the write ceiling of {ceiling}",
                    rows.len()
                )));
            }
        }

        let table = inner.tables.entry(batch.table.to_string()).or_default();
        let mut affected = 0u64;
        for row in rows {
            let key = row
                .get(batch.key_column)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match table.get_mut(&key) {
                Some(existing) if *existing == row => {},
                Some(existing) => {
                    existing.extend(row);
                    affected += 1;
                },
                None => {
                    table.insert(key, row);
                    affected += 1;
                },
            }
        }

        debug!(table = batch.table, call, affected, "In-memory upsert");
        Ok(affected)
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load(&self, raw_capture_id: i64) -> Result<Option<RawCapture>> {
        Ok(self.capture(raw_capture_id))
    }

    async fn mark_processed(&self, raw_capture_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_mark_processed {
            return Err(IngestError::StoreMessage(format!(
                "injected failure marking raw capture {raw_capture_id}"
            )));
        }
        let capture = inner
            .captures
            .get_mut(&raw_capture_id)
            .ok_or(IngestError::RawCaptureNotFound(raw_capture_id))?;
        capture.processed = true;
        capture.processed_at.get_or_insert(at);
        Ok(())
    }
}

#[async_trait]
impl CaptureSink for InMemoryStore {
    async fn persist(&self, capture: NewRawCapture) -> Result<i64> {
        let mut inner = self.lock();
        let id = inner.captures.keys().next_back().map_or(1, |last| last + 1);
        inner.captures.insert(id, capture.into_raw_capture(id, Utc::now()));
        Ok(id)
    }
}
