//! State Tracker
//!
//! Flags a raw capture as processed once at least one of its rows was
//! durably written. Captures that produced no rows (empty payloads, every
//! chunk failed) stay unprocessed so a later run can pick them up.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::StateStore;

pub struct StateTracker {
    store: Arc<dyn StateStore>,
}

impl StateTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Mark the capture processed if `total_inserted > 0`
    ///
    /// Returns whether the capture is now marked. A store failure is logged
    /// and reported as `false`; the rows are already durable, so a re-run
    /// converges.
    pub async fn record(&self, raw_capture_id: i64, total_inserted: u64) -> bool {
        if total_inserted == 0 {
            info!(raw_capture_id, "Nothing inserted, leaving raw capture unprocessed");
            return false;
        }

        match self.store.mark_processed(raw_capture_id, Utc::now()).await {
            Ok(()) => {
                info!(raw_capture_id, total_inserted, "Raw capture marked processed");
                true
            },
            Err(err) => {
                warn!(raw_capture_id, error = %err, "Failed to mark raw capture processed");
                false
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capture::{CaptureSink, NewRawCapture};
    use crate::store::InMemoryStore;
    use serde_json::json;

    async fn store_with_capture() -> (Arc<InMemoryStore>, i64) {
        let store = Arc::new(InMemoryStore::new());
        let id = store
            .persist(NewRawCapture::new(1, "periodo", json!({"list": []})))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_zero_inserted_leaves_capture_unprocessed() {
        let (store, id) = store_with_capture().await;
        let tracker = StateTracker::new(store.clone());

        assert!(!tracker.record(id, 0).await);
        assert!(!store.capture(id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_positive_insert_marks_capture() {
        let (store, id) = store_with_capture().await;
        let tracker = StateTracker::new(store.clone());

        assert!(tracker.record(id, 3).await);
        let capture = store.capture(id).unwrap();
        assert!(capture.processed);
        assert!(capture.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_fatal() {
        let (store, id) = store_with_capture().await;
        store.fail_mark_processed(true);
        let tracker = StateTracker::new(store.clone());

        assert!(!tracker.record(id, 3).await);
        assert!(!store.capture(id).unwrap().processed);
    }
}
