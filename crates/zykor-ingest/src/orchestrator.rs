//! Ingestion Orchestrator
//!
//! Drives one invocation: load the raw capture, resolve its descriptor,
//! transform, derive keys, write in chunks and update the capture's state.
//! Only a missing capture, an unknown data type or invalid input abort the
//! run; everything else ends in an [`IngestionOutcome`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::PipelineSettings;
use crate::error::{IngestError, Result};
use crate::keys::{derive_keys, IdempotencyKey};
use crate::models::{IngestionOutcome, InvocationRequest, RawCapture};
use crate::record::{KeyedRecord, NormalizedRecord};
use crate::schema::{SchemaDescriptor, SchemaRegistry};
use crate::state::StateTracker;
use crate::store::{StateStore, TargetStore};
use crate::transform::Transformer;
use crate::writer::BatchWriter;

pub struct IngestionOrchestrator {
    settings: PipelineSettings,
    registry: Arc<SchemaRegistry>,
    state: Arc<dyn StateStore>,
    writer: BatchWriter,
    tracker: StateTracker,
}

impl IngestionOrchestrator {
    pub fn new(
        settings: PipelineSettings,
        registry: Arc<SchemaRegistry>,
        state: Arc<dyn StateStore>,
        target: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            settings,
            registry,
            writer: BatchWriter::new(target, settings.writer),
            tracker: StateTracker::new(state.clone()),
            state,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Run the pipeline for one raw capture
    #[instrument(skip(self, request), fields(raw_capture_id = request.raw_capture_id))]
    pub async fn run(&self, request: InvocationRequest) -> Result<IngestionOutcome> {
        let started = Instant::now();

        if request.batch_size == Some(0) {
            return Err(IngestError::InvalidInput(
                "batch_size must be greater than 0".into(),
            ));
        }

        let capture = self
            .state
            .load(request.raw_capture_id)
            .await?
            .ok_or(IngestError::RawCaptureNotFound(request.raw_capture_id))?;
        let descriptor = self.registry.get(&capture.data_type)?;
        let batch_size = request.batch_size.unwrap_or(descriptor.batch_size);

        info!(
            data_type = %capture.data_type,
            tenant_id = capture.tenant_id,
            table = %descriptor.table,
            batch_size,
            "Processing raw capture"
        );

        if capture.processed && self.settings.skip_processed {
            info!("Raw capture already processed, skipping");
            let mut outcome = empty_outcome(&capture, started);
            outcome.marked_processed = true;
            outcome.skipped_already_processed = true;
            return Ok(outcome);
        }

        let (records, payload_error) = Transformer::new(descriptor).transform(&capture);
        let total_records = records.len();
        let (keyed, duplicate_records) =
            collapse_duplicate_keys(key_records(descriptor, &capture, records));
        if duplicate_records > 0 {
            warn!(
                duplicate_records,
                distinct_records = keyed.len(),
                "Records shared an idempotency key, keeping the last of each"
            );
        }

        let batches = self
            .writer
            .write_all(descriptor, capture.tenant_id, &keyed, batch_size)
            .await?;
        let total_inserted: u64 = batches.iter().map(|b| b.inserted_count).sum();
        let marked_processed = self.tracker.record(capture.id, total_inserted).await;

        let outcome = IngestionOutcome {
            raw_capture_id: capture.id,
            tenant_id: capture.tenant_id,
            data_type: capture.data_type.clone(),
            total_records,
            duplicate_records,
            total_inserted,
            batches,
            marked_processed,
            skipped_already_processed: false,
            payload_error: payload_error.map(|e| e.to_string()),
            duration_secs: started.elapsed().as_secs_f64(),
        };

        if outcome.is_under_inserted() {
            warn!(
                failed_batches = outcome.failed_batches().count(),
                total_records = outcome.total_records,
                total_inserted,
                "Ingestion finished with failed chunks"
            );
        } else {
            info!(
                total_records = outcome.total_records,
                total_inserted,
                duration_secs = outcome.duration_secs,
                "Ingestion finished"
            );
        }

        Ok(outcome)
    }
}

fn key_records(
    descriptor: &SchemaDescriptor,
    capture: &RawCapture,
    records: Vec<NormalizedRecord>,
) -> Vec<KeyedRecord> {
    let keys = derive_keys(
        &records,
        capture.tenant_id,
        &descriptor.data_type,
        &descriptor.key_strategy,
    );
    keys.into_iter()
        .zip(records)
        .map(|(key, record)| KeyedRecord::new(key, record))
        .collect()
}

/// Keep one record per key: the first position, the last value
///
/// A conflict key may appear only once per upsert statement, and a repeated
/// key would otherwise be counted twice.
fn collapse_duplicate_keys(keyed: Vec<KeyedRecord>) -> (Vec<KeyedRecord>, usize) {
    let mut positions: HashMap<IdempotencyKey, usize> = HashMap::with_capacity(keyed.len());
    let mut distinct: Vec<KeyedRecord> = Vec::with_capacity(keyed.len());
    let mut duplicates = 0;

    for record in keyed {
        match positions.get(&record.key) {
            Some(&position) => {
                distinct[position] = record;
                duplicates += 1;
            },
            None => {
                positions.insert(record.key.clone(), distinct.len());
                distinct.push(record);
            },
        }
    }
    (distinct, duplicates)
}

fn empty_outcome(capture: &RawCapture, started: Instant) -> IngestionOutcome {
    IngestionOutcome {
        raw_capture_id: capture.id,
        tenant_id: capture.tenant_id,
        data_type: capture.data_type.clone(),
        total_records: 0,
        duplicate_records: 0,
        total_inserted: 0,
        batches: Vec::new(),
        marked_processed: false,
        skipped_already_processed: false,
        payload_error: None,
        duration_secs: started.elapsed().as_secs_f64(),
    }
}
