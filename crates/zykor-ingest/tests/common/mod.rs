//! Shared helpers for zykor-ingest integration tests
//!
//! Builds ContaHub/Nibo shaped payloads and wires an orchestrator over the
//! in-memory store with pacing disabled.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use zykor_ingest::writer::WriterSettings;
use zykor_ingest::{
    InMemoryStore, IngestionOrchestrator, PipelineSettings, RawCapture, SchemaRegistry,
};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,zykor_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn capture(id: i64, tenant_id: i64, data_type: &str, payload: Value) -> RawCapture {
    RawCapture {
        id,
        tenant_id,
        data_type: data_type.to_string(),
        data_date: None,
        captured_at: Utc.with_ymd_and_hms(2025, 2, 2, 6, 0, 0).unwrap(),
        source_payload: payload,
        record_count: None,
        processed: false,
        processed_at: None,
    }
}

/// ContaHub payment line; `n` makes the line unique
pub fn pagamento(n: usize) -> Value {
    json!({
        "vd": format!("{}", 100_000 + n),
        "trn": "812",
        "dt_gerencial": "2025-02-01T00:00:00-0300",
        "hr_lancamento": "21:14",
        "mesa": format!("M{}", n % 40),
        "cli": n % 7,
        "$valor": format!("{}.50", 10 + n % 90),
        "pag": "PIX",
        "tipo": "Pix",
        "usr_lancou": "caixa",
    })
}

pub fn pagamentos_payload(count: usize) -> Value {
    json!({ "list": (0..count).map(pagamento).collect::<Vec<_>>() })
}

pub fn agendamento(id: &str, value: f64) -> Value {
    json!({
        "scheduleId": id,
        "type": "Debit",
        "value": value,
        "dueDate": "2025-03-10T00:00:00",
        "category": { "id": "cat-1", "name": "Fornecedores" },
        "stakeholder": { "id": "stk-9", "name": "Ambev", "type": "Supplier" },
        "recurring": false,
    })
}

pub fn settings(write_ceiling: usize) -> PipelineSettings {
    PipelineSettings {
        writer: WriterSettings {
            write_ceiling,
            pacing_delay: Duration::ZERO,
        },
        skip_processed: false,
    }
}

pub fn orchestrator(store: &Arc<InMemoryStore>, settings: PipelineSettings) -> IngestionOrchestrator {
    let registry = SchemaRegistry::builtin().expect("built-in descriptors are valid");
    IngestionOrchestrator::new(settings, Arc::new(registry), store.clone(), store.clone())
}
