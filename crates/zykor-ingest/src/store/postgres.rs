//! PostgreSQL backend
//!
//! Direct writes through a sqlx pool. Upserts are a single multi-row
//! `INSERT ... ON CONFLICT (key) DO UPDATE ... WHERE ... IS DISTINCT FROM`,
//! so rows whose stored values already match are not counted as affected.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{debug, info};

use super::{validate_identifier, StateStore, TargetStore, UpsertBatch, DEFAULT_RAW_TABLE};
use crate::capture::{CaptureSink, NewRawCapture};
use crate::error::{IngestError, Result};
use crate::models::RawCapture;
use crate::record::FieldValue;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub struct PgStore {
    pool: PgPool,
    raw_table: String,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            raw_table: DEFAULT_RAW_TABLE.to_string(),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .connect(database_url)
            .await
            .map_err(|e| IngestError::store("connect to database", e))?;
        info!("Database connection pool established");
        Ok(Self::new(pool))
    }

    pub fn with_raw_table(mut self, raw_table: &str) -> Result<Self> {
        self.raw_table = validate_identifier(raw_table)?.to_string();
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn quoted(identifier: &str) -> Result<String> {
    Ok(format!("\"{}\"", validate_identifier(identifier)?))
}

fn raw_capture_from_row(row: &PgRow) -> Result<RawCapture> {
    Ok(RawCapture {
        id: row.try_get("id")?,
        tenant_id: row.try_get("bar_id")?,
        data_type: row.try_get("data_type")?,
        data_date: row.try_get::<Option<NaiveDate>, _>("data_date")?,
        captured_at: row.try_get("created_at")?,
        source_payload: row.try_get::<Option<Value>, _>("raw_json")?.unwrap_or(Value::Null),
        record_count: row.try_get("record_count")?,
        processed: row.try_get("processed")?,
        processed_at: row.try_get("processed_at")?,
    })
}

#[async_trait]
impl TargetStore for PgStore {
    async fn upsert(&self, batch: UpsertBatch<'_>) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let columns = batch
            .columns()?
            .into_iter()
            .map(quoted)
            .collect::<Result<Vec<_>>>()?;
        let tenant_column = quoted(batch.tenant_column)?;
        let key_column = quoted(batch.key_column)?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} AS t ({}, {}, {}) ",
            quoted(batch.table)?,
            columns.join(", "),
            tenant_column,
            key_column
        ));

        builder.push_values(batch.records, |mut b, keyed| {
            for value in UpsertBatch::values(keyed) {
                match value {
                    FieldValue::Text(s) => b.push_bind(s.as_str()),
                    FieldValue::Integer(i) => b.push_bind(*i),
                    FieldValue::Float(f) => b.push_bind(*f),
                    FieldValue::Bool(v) => b.push_bind(*v),
                    FieldValue::Date(d) => b.push_bind(*d),
                    FieldValue::Timestamp(t) => b.push_bind(*t),
                    FieldValue::Json(j) => b.push_bind(j.clone()),
                };
            }
            b.push_bind(batch.tenant_id).push_bind(keyed.key.as_str());
        });

        let assignments = columns
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let current = columns
            .iter()
            .map(|c| format!("t.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let incoming = columns
            .iter()
            .map(|c| format!("EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        builder.push(format!(
            " ON CONFLICT ({key_column}) DO UPDATE SET {assignments} \
             WHERE ROW({current}) IS DISTINCT FROM ROW({incoming})"
        ));

        let affected = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::store(format!("upsert into {}", batch.table), e))?
            .rows_affected();

        debug!(table = batch.table, sent = batch.len(), affected, "Postgres upsert");
        Ok(affected)
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn load(&self, raw_capture_id: i64) -> Result<Option<RawCapture>> {
        let sql = format!(
            r#"
            SELECT
                id::bigint AS id, bar_id::bigint AS bar_id, data_type, data_date,
                raw_json, record_count::bigint AS record_count,
                COALESCE(processed, false) AS processed, processed_at, created_at
            FROM {}
            WHERE id = $1
            "#,
            quoted(&self.raw_table)?
        );
        let row = sqlx::query(&sql)
            .bind(raw_capture_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(raw_capture_from_row).transpose()
    }

    async fn mark_processed(&self, raw_capture_id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET processed = true, processed_at = COALESCE(processed_at, $2) WHERE id = $1",
            quoted(&self.raw_table)?
        );
        let updated = sqlx::query(&sql)
            .bind(raw_capture_id)
            .bind(at)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(IngestError::RawCaptureNotFound(raw_capture_id));
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureSink for PgStore {
    async fn persist(&self, capture: NewRawCapture) -> Result<i64> {
        let sql = format!(
            r#"
            INSERT INTO {} (bar_id, data_type, data_date, raw_json, record_count, processed)
            VALUES ($1, $2, $3, $4, $5, false)
            RETURNING id::bigint
            "#,
            quoted(&self.raw_table)?
        );
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(capture.tenant_id)
            .bind(&capture.data_type)
            .bind(capture.data_date)
            .bind(&capture.source_payload)
            .bind(capture.record_count)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }
}
