//! REST backend against a mock PostgREST endpoint

mod common;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::settings;
use zykor_ingest::capture::{CaptureSink, NewRawCapture};
use zykor_ingest::store::UpsertBatch;
use zykor_ingest::{
    FieldValue, IdempotencyKey, IngestError, IngestionOrchestrator, InvocationRequest,
    KeyedRecord, NormalizedRecord, RestStore, SchemaRegistry, StateStore, TargetStore,
};

const KEY: &str = "service-role-key";

fn store(server: &MockServer) -> RestStore {
    RestStore::new(&server.uri(), KEY, Duration::from_secs(5)).unwrap()
}

fn keyed(key: &str, valor: f64) -> KeyedRecord {
    let mut record = NormalizedRecord::new(0);
    record.set("valor", FieldValue::Float(valor));
    KeyedRecord::new(IdempotencyKey::from_raw(key), record)
}

#[tokio::test]
async fn test_upsert_sends_conflict_target_and_counts_returned_rows() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/contahub_pagamentos"))
        .and(query_param("on_conflict", "idempotency_key"))
        .and(header("apikey", KEY))
        .and(header("authorization", format!("Bearer {KEY}").as_str()))
        .and(header_regex("prefer", "resolution=merge-duplicates"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "idempotency_key": "a" },
            { "idempotency_key": "b" },
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let records = vec![keyed("a", 1.0), keyed("b", 2.0), keyed("c", 3.0)];
    let affected = store(&server)
        .upsert(UpsertBatch {
            table: "contahub_pagamentos",
            tenant_column: "bar_id",
            tenant_id: 3,
            key_column: "idempotency_key",
            records: &records,
        })
        .await?;

    assert_eq!(affected, 2);
    Ok(())
}

#[tokio::test]
async fn test_upsert_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("statement timeout"))
        .mount(&server)
        .await;

    let records = vec![keyed("a", 1.0)];
    let err = store(&server)
        .upsert(UpsertBatch {
            table: "contahub_pagamentos",
            tenant_column: "bar_id",
            tenant_id: 3,
            key_column: "idempotency_key",
            records: &records,
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("statement timeout"));
}

#[tokio::test]
async fn test_load_reads_legacy_column_names() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/nibo_raw_data"))
        .and(query_param("id", "eq.21"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 21,
            "bar_id": 3,
            "data_type": "agendamentos",
            "data_date": "2025-02-01",
            "created_at": "2025-02-02T06:00:00Z",
            "raw_json": { "items": [] },
            "processed": false,
            "processed_at": null,
        }])))
        .mount(&server)
        .await;

    let capture = store(&server)
        .with_raw_table("nibo_raw_data")?
        .load(21)
        .await?
        .expect("capture returned");

    assert_eq!(capture.tenant_id, 3);
    assert_eq!(capture.data_type, "agendamentos");
    assert_eq!(capture.source_payload, json!({ "items": [] }));
    assert!(!capture.processed);
    Ok(())
}

#[tokio::test]
async fn test_load_missing_capture_is_none() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(store(&server).load(5).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_mark_processed_only_touches_unprocessed_rows() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/contahub_raw_data"))
        .and(query_param("id", "eq.8"))
        .and(query_param("processed", "is.false"))
        .and(query_param("select", "id"))
        .and(body_partial_json(json!({ "processed": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 8 }])))
        .expect(1)
        .mount(&server)
        .await;

    let at = Utc.with_ymd_and_hms(2025, 2, 2, 7, 0, 0).unwrap();
    store(&server).mark_processed(8, at).await?;
    Ok(())
}

fn processed_row(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "bar_id": 3,
        "data_type": "tempo",
        "created_at": "2025-02-02T06:00:00Z",
        "raw_json": { "list": [] },
        "processed": true,
        "processed_at": "2025-02-02T07:00:00Z",
    })
}

#[tokio::test]
async fn test_mark_processed_on_already_processed_capture_succeeds() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("id", "eq.9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([processed_row(9)])))
        .expect(1)
        .mount(&server)
        .await;

    let at = Utc.with_ymd_and_hms(2025, 2, 3, 7, 0, 0).unwrap();
    store(&server).mark_processed(9, at).await?;
    Ok(())
}

#[tokio::test]
async fn test_mark_processed_on_missing_capture_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let at = Utc.with_ymd_and_hms(2025, 2, 3, 7, 0, 0).unwrap();
    let err = store(&server).mark_processed(404, at).await.unwrap_err();
    assert!(matches!(err, IngestError::RawCaptureNotFound(404)));
}

#[tokio::test]
async fn test_persist_returns_new_id() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/contahub_raw_data"))
        .and(body_partial_json(json!([{ "bar_id": 3, "data_type": "tempo" }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": 77 }])))
        .mount(&server)
        .await;

    let id = store(&server)
        .persist(NewRawCapture::new(3, "tempo", json!({ "list": [] })))
        .await?;

    assert_eq!(id, 77);
    Ok(())
}

#[tokio::test]
async fn test_full_run_over_rest() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/contahub_raw_data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 30,
            "bar_id": 3,
            "data_type": "pagamentos",
            "created_at": "2025-02-02T06:00:00Z",
            "raw_json": common::pagamentos_payload(4),
            "processed": false,
        }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/contahub_pagamentos"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {}, {}, {}, {}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/contahub_raw_data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 30 }])))
        .expect(1)
        .mount(&server)
        .await;

    let rest = Arc::new(store(&server));
    let orchestrator = IngestionOrchestrator::new(
        settings(1000),
        Arc::new(SchemaRegistry::builtin()?),
        rest.clone(),
        rest,
    );
    let outcome = orchestrator.run(InvocationRequest::new(30)).await?;

    assert_eq!(outcome.total_inserted, 4);
    assert!(outcome.marked_processed);
    Ok(())
}
