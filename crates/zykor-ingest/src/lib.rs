//! Zykor Ingest Library
//!
//! Turns raw captures of external feeds (ContaHub point-of-sale exports,
//! the Nibo accounting API) into typed rows in a shared store. Every run is
//! idempotent: rows carry a deterministic key and are merged on it, so a
//! capture can be re-processed after a partial failure without duplicates.
//!
//! # Pipeline
//!
//! - [`transform`]: payload → typed, defaulted records
//! - [`keys`]: per-record idempotency keys
//! - [`writer`]: chunked, paced upserts tolerating per-chunk failure
//! - [`state`]: processed flag on the raw capture
//! - [`orchestrator`]: one invocation end to end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zykor_ingest::{
//!     IngestConfig, IngestionOrchestrator, InvocationRequest, RestStore, SchemaRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = Arc::new(RestStore::new(
//!         config.supabase_url.as_deref().unwrap_or_default(),
//!         config.supabase_key.clone().unwrap_or_default(),
//!         config.http_timeout(),
//!     )?);
//!     let orchestrator = IngestionOrchestrator::new(
//!         config.pipeline_settings(),
//!         Arc::new(SchemaRegistry::builtin()?),
//!         store.clone(),
//!         store,
//!     );
//!     let outcome = orchestrator.run(InvocationRequest::new(42)).await?;
//!     println!("{}", serde_json::to_string(&outcome.summary())?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod capture;
pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod orchestrator;
pub mod record;
pub mod replay;
pub mod schema;
pub mod state;
pub mod store;
pub mod transform;
pub mod writer;

pub use config::{IngestConfig, PipelineSettings, StoreBackend};
pub use error::{IngestError, Result};
pub use keys::{derive_key, derive_keys, IdempotencyKey, KeyStrategy, Uniquifier};
pub use models::{BatchResult, IngestionOutcome, InvocationRequest, InvocationSummary, RawCapture};
pub use orchestrator::IngestionOrchestrator;
pub use record::{FieldValue, KeyedRecord, NormalizedRecord};
pub use schema::{FieldKind, FieldSpec, SchemaDescriptor, SchemaRegistry};
pub use store::{InMemoryStore, RestStore, StateStore, TargetStore};
#[cfg(feature = "database")]
pub use store::PgStore;
