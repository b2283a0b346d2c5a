//! Replay files
//!
//! A replay file holds either a raw capture row exported from one of the
//! `*_raw_data` tables or a bare source payload. Bare payloads need the data
//! type and tenant supplied by the caller.

use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use zykor_common::checksum::verify_md5;
use zykor_common::ZykorError;

use crate::error::{IngestError, Result};
use crate::models::RawCapture;

/// Id given to captures built from a bare payload
pub const REPLAY_CAPTURE_ID: i64 = 1;

/// Data type and tenant for a bare payload
#[derive(Debug, Clone, Default)]
pub struct BarePayloadContext {
    pub data_type: Option<String>,
    pub tenant_id: Option<i64>,
}

/// Read a replay file, optionally checking its MD5 first
pub fn load_replay_file(
    path: &Path,
    expected_md5: Option<&str>,
    context: BarePayloadContext,
) -> Result<RawCapture> {
    let bytes = std::fs::read(path).map_err(ZykorError::from)?;
    if let Some(expected) = expected_md5 {
        verify_md5(&bytes, expected)?;
    }

    let value: Value = serde_json::from_slice(&bytes)?;
    if let Ok(capture) = serde_json::from_value::<RawCapture>(value.clone()) {
        debug!(path = %path.display(), raw_capture_id = capture.id, "Replay file is a raw capture row");
        return Ok(capture);
    }

    let (Some(data_type), Some(tenant_id)) = (context.data_type, context.tenant_id) else {
        return Err(IngestError::InvalidInput(format!(
            "{} is not a raw capture row; a data type and tenant are needed for a bare payload",
            path.display()
        )));
    };
    Ok(RawCapture {
        id: REPLAY_CAPTURE_ID,
        tenant_id,
        data_type,
        data_date: None,
        captured_at: Utc::now(),
        source_payload: value,
        record_count: None,
        processed: false,
        processed_at: None,
    })
}
