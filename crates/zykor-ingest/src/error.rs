//! Error taxonomy for the ingestion pipeline
//!
//! Only `RawCaptureNotFound`, `MissingConfiguration`, `UnsupportedDataType`
//! and `InvalidInput` abort an invocation. Malformed payloads and failed
//! chunk writes are recovered locally and surface in the outcome instead.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Payload lacks the expected item container
    #[error("Malformed source payload for raw capture {raw_capture_id}: {reason}")]
    MalformedSourcePayload { raw_capture_id: i64, reason: String },

    /// One upsert call against the target store failed
    #[error("Chunk {batch_index} write to {table} failed: {message}")]
    ChunkWriteFailure {
        batch_index: usize,
        table: String,
        message: String,
    },

    #[error("Raw capture {0} not found")]
    RawCaptureNotFound(i64),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {context}")]
    Store {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Store rejected request: {0}")]
    StoreMessage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] zykor_common::ZykorError),
}

impl IngestError {
    /// Wrap a backend error, keeping its source chain
    pub fn store(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error aborts the invocation rather than being recorded
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IngestError::MalformedSourcePayload { .. } | IngestError::ChunkWriteFailure { .. }
        )
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::store("database", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors_are_not_fatal() {
        let malformed = IngestError::MalformedSourcePayload {
            raw_capture_id: 7,
            reason: "missing 'list'".into(),
        };
        let chunk = IngestError::ChunkWriteFailure {
            batch_index: 1,
            table: "contahub_periodo".into(),
            message: "timeout".into(),
        };
        assert!(!malformed.is_fatal());
        assert!(!chunk.is_fatal());
        assert!(IngestError::RawCaptureNotFound(7).is_fatal());
        assert!(IngestError::MissingConfiguration("DATABASE_URL".into()).is_fatal());
    }

    #[test]
    fn test_store_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timeout");
        let err = IngestError::store("upsert contahub_tempo", io);
        assert_eq!(err.to_string(), "Store error: upsert contahub_tempo");
        assert!(std::error::Error::source(&err).is_some());
    }
}
