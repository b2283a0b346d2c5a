//! PostgREST-style HTTP backend
//!
//! Talks to a Supabase project's `/rest/v1` endpoint with the service role
//! key. Upserts use `on_conflict` plus `Prefer: resolution=merge-duplicates`
//! and count the rows echoed back; state updates filter on
//! `processed=is.false` so the first `processed_at` is never overwritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{validate_identifier, StateStore, TargetStore, UpsertBatch, DEFAULT_RAW_TABLE};
use crate::capture::{CaptureSink, NewRawCapture};
use crate::error::{IngestError, Result};
use crate::models::RawCapture;

// ============================================================================
// REST Client Constants
// ============================================================================

/// Default timeout for store requests in seconds
pub const DEFAULT_REST_TIMEOUT_SECS: u64 = 60;

const REST_PREFIX: &str = "/rest/v1";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";
const PREFER_RETURN: &str = "return=representation";

pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    raw_table: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            raw_table: DEFAULT_RAW_TABLE.to_string(),
        })
    }

    /// Table holding raw captures (`contahub_raw_data`, `nibo_raw_data`)
    pub fn with_raw_table(mut self, raw_table: &str) -> Result<Self> {
        self.raw_table = validate_identifier(raw_table)?.to_string();
        Ok(self)
    }

    fn table_url(&self, table: &str) -> Result<String> {
        Ok(format!(
            "{}{}/{}",
            self.base_url,
            REST_PREFIX,
            validate_identifier(table)?
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn checked(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IngestError::StoreMessage(format!(
            "{action} returned {status}: {body}"
        )))
    }
}

#[async_trait]
impl TargetStore for RestStore {
    async fn upsert(&self, batch: UpsertBatch<'_>) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let url = self.table_url(batch.table)?;
        let key_column = validate_identifier(batch.key_column)?;

        let request = self
            .client
            .post(&url)
            .query(&[("on_conflict", key_column), ("select", key_column)])
            .header("Prefer", PREFER_UPSERT)
            .json(&batch.rows());
        let response = self.authorized(request).send().await?;
        let returned: Vec<Value> = Self::checked(response, &format!("upsert into {}", batch.table))
            .await?
            .json()
            .await?;

        debug!(table = batch.table, sent = batch.len(), returned = returned.len(), "REST upsert");
        Ok(returned.len() as u64)
    }
}

#[async_trait]
impl StateStore for RestStore {
    async fn load(&self, raw_capture_id: i64) -> Result<Option<RawCapture>> {
        let request = self
            .client
            .get(self.table_url(&self.raw_table)?)
            .query(&[("id", format!("eq.{raw_capture_id}")), ("select", "*".to_string())]);
        let response = self.authorized(request).send().await?;
        let mut rows: Vec<RawCapture> = Self::checked(response, "load raw capture")
            .await?
            .json()
            .await?;
        Ok(rows.pop())
    }

    async fn mark_processed(&self, raw_capture_id: i64, at: DateTime<Utc>) -> Result<()> {
        let request = self
            .client
            .patch(self.table_url(&self.raw_table)?)
            .query(&[
                ("id", format!("eq.{raw_capture_id}")),
                ("processed", "is.false".to_string()),
                ("select", "id".to_string()),
            ])
            .header("Prefer", PREFER_RETURN)
            .json(&json!({ "processed": true, "processed_at": at }));
        let response = self.authorized(request).send().await?;
        let updated: Vec<Value> = Self::checked(response, "mark raw capture processed")
            .await?
            .json()
            .await?;
        if !updated.is_empty() {
            return Ok(());
        }

        // No unprocessed row matched: either already processed or missing
        match self.load(raw_capture_id).await? {
            Some(_) => Ok(()),
            None => Err(IngestError::RawCaptureNotFound(raw_capture_id)),
        }
    }
}

#[async_trait]
impl CaptureSink for RestStore {
    async fn persist(&self, capture: NewRawCapture) -> Result<i64> {
        let row = json!({
            "bar_id": capture.tenant_id,
            "data_type": capture.data_type,
            "data_date": capture.data_date,
            "raw_json": capture.source_payload,
            "record_count": capture.record_count,
            "processed": false,
        });
        let request = self
            .client
            .post(self.table_url(&self.raw_table)?)
            .query(&[("select", "id")])
            .header("Prefer", PREFER_RETURN)
            .json(&[row]);
        let response = self.authorized(request).send().await?;
        let inserted: Vec<Value> = Self::checked(response, "insert raw capture")
            .await?
            .json()
            .await?;

        inserted
            .first()
            .and_then(|row| row.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| IngestError::StoreMessage("insert raw capture returned no id".into()))
    }
}
