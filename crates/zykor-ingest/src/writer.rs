//! Batch Writer
//!
//! Splits keyed records into chunks of `min(batch_size, write_ceiling)` and
//! issues one upsert per chunk, in order, pausing between calls. A failed
//! chunk is recorded and the remaining chunks still run; there is no
//! in-run retry, a later re-run converges through the idempotency keys.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::models::BatchResult;
use crate::record::KeyedRecord;
use crate::schema::SchemaDescriptor;
use crate::store::{TargetStore, UpsertBatch};

/// Most rows the target store accepts in one call
pub const DEFAULT_WRITE_CEILING: usize = 1000;

/// Pause between consecutive chunk writes
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(100);

/// Effective rows per upsert call
pub fn chunk_size(batch_size: usize, write_ceiling: usize) -> Result<usize> {
    if batch_size == 0 {
        return Err(IngestError::InvalidInput(
            "batch_size must be greater than 0".into(),
        ));
    }
    if write_ceiling == 0 {
        return Err(IngestError::InvalidInput(
            "write_ceiling must be greater than 0".into(),
        ));
    }
    Ok(batch_size.min(write_ceiling))
}

/// Index ranges of each chunk, covering `0..len` in order
pub fn plan_chunks(len: usize, batch_size: usize, write_ceiling: usize) -> Result<Vec<Range<usize>>> {
    let size = chunk_size(batch_size, write_ceiling)?;
    Ok((0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    pub write_ceiling: usize,
    pub pacing_delay: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            write_ceiling: DEFAULT_WRITE_CEILING,
            pacing_delay: DEFAULT_PACING_DELAY,
        }
    }
}

pub struct BatchWriter {
    store: Arc<dyn TargetStore>,
    settings: WriterSettings,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn TargetStore>, settings: WriterSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    /// Write every record into the descriptor's table
    ///
    /// Only an invalid `batch_size` is an error; store failures become
    /// failed `BatchResult`s.
    pub async fn write_all(
        &self,
        descriptor: &SchemaDescriptor,
        tenant_id: i64,
        records: &[KeyedRecord],
        batch_size: usize,
    ) -> Result<Vec<BatchResult>> {
        let chunks = plan_chunks(records.len(), batch_size, self.settings.write_ceiling)?;
        let total_chunks = chunks.len();
        let mut results = Vec::with_capacity(total_chunks);

        info!(
            table = %descriptor.table,
            records = records.len(),
            chunks = total_chunks,
            "Writing records"
        );

        for (batch_index, range) in chunks.into_iter().enumerate() {
            let chunk = &records[range];
            let batch = UpsertBatch {
                table: &descriptor.table,
                tenant_column: &descriptor.tenant_column,
                tenant_id,
                key_column: &descriptor.key_column,
                records: chunk,
            };

            let result = match self.store.upsert(batch).await {
                Ok(affected) => {
                    let attempted = chunk.len();
                    let inserted = if affected > attempted as u64 {
                        warn!(
                            batch_index,
                            affected,
                            attempted,
                            "Store reported more affected rows than sent, clamping"
                        );
                        attempted as u64
                    } else {
                        affected
                    };
                    debug!(batch_index, attempted, inserted, "Chunk written");
                    BatchResult::succeeded(batch_index, attempted, inserted)
                },
                Err(err) => {
                    let failure = IngestError::ChunkWriteFailure {
                        batch_index,
                        table: descriptor.table.clone(),
                        message: err.to_string(),
                    };
                    warn!(batch_index, attempted = chunk.len(), error = %failure, "Chunk write failed");
                    BatchResult::failed(batch_index, chunk.len(), failure.to_string())
                },
            };
            results.push(result);

            if batch_index + 1 < total_chunks && !self.settings.pacing_delay.is_zero() {
                tokio::time::sleep(self.settings.pacing_delay).await;
            }
        }

        Ok(results)
    }
}
