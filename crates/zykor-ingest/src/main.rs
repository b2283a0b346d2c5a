//! Zykor Ingest - raw capture processing tool

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use zykor_common::logging::{init_logging, LogConfig, LogLevel};
use zykor_ingest::capture::{CaptureProducer, CaptureSink, HttpPageSource};
use zykor_ingest::replay::{load_replay_file, BarePayloadContext};
use zykor_ingest::{
    InMemoryStore, IngestConfig, IngestionOrchestrator, InvocationRequest, RestStore,
    SchemaRegistry, StateStore, StoreBackend, TargetStore,
};

#[derive(Parser, Debug)]
#[command(name = "zykor-ingest")]
#[command(author, version, about = "Zykor raw capture ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one stored raw capture
    Process {
        /// Raw capture id
        #[arg(short, long)]
        raw_capture_id: i64,

        /// Rows per upsert call (defaults to the data type's batch size)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Store backend, overrides INGEST_BACKEND
        #[arg(long)]
        backend: Option<StoreBackend>,

        /// Raw capture table, overrides INGEST_RAW_TABLE
        #[arg(long)]
        raw_table: Option<String>,

        /// Skip captures already marked processed
        #[arg(long)]
        skip_processed: bool,

        /// Print the full outcome instead of the summary
        #[arg(long)]
        full: bool,
    },

    /// Run a raw capture JSON file through the in-memory store
    Replay {
        /// Raw capture row, or a bare payload with --data-type and --tenant-id
        #[arg(short, long)]
        file: PathBuf,

        /// Data type for a bare payload
        #[arg(long)]
        data_type: Option<String>,

        /// Tenant for a bare payload
        #[arg(long)]
        tenant_id: Option<i64>,

        /// Expected MD5 of the file
        #[arg(long)]
        md5: Option<String>,

        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Page through an HTTP listing and store it as one raw capture
    Capture {
        /// Listing URL accepting offset/limit query parameters
        #[arg(long)]
        url: String,

        #[arg(long)]
        tenant_id: i64,

        #[arg(long)]
        data_type: String,

        /// Fetch window, e.g. 2025-02-01
        #[arg(long)]
        data_date: Option<NaiveDate>,

        /// Response field holding the page items (bare array if omitted)
        #[arg(long)]
        items_field: Option<String>,

        /// Bearer token for the listing
        #[arg(long, env = "CAPTURE_BEARER_TOKEN", hide_env_values = true)]
        bearer_token: Option<String>,

        /// Process the capture right after storing it
        #[arg(long)]
        process: bool,
    },

    /// List supported data types
    DataTypes,
}

struct Stores {
    state: Arc<dyn StateStore>,
    target: Arc<dyn TargetStore>,
    sink: Arc<dyn CaptureSink>,
}

impl Stores {
    fn from_single<S>(store: Arc<S>) -> Self
    where
        S: StateStore + TargetStore + CaptureSink + 'static,
    {
        Self {
            state: store.clone(),
            target: store.clone(),
            sink: store,
        }
    }
}

async fn connect(config: &IngestConfig) -> Result<Stores> {
    match config.backend {
        StoreBackend::Rest => {
            let (Some(url), Some(key)) = (&config.supabase_url, &config.supabase_key) else {
                bail!("REST backend needs SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY");
            };
            let store = RestStore::new(url, key.clone(), config.http_timeout())?
                .with_raw_table(&config.raw_table)?;
            Ok(Stores::from_single(Arc::new(store)))
        },
        #[cfg(feature = "database")]
        StoreBackend::Postgres => {
            let Some(url) = &config.database_url else {
                bail!("Postgres backend needs DATABASE_URL");
            };
            let store = zykor_ingest::PgStore::connect(url)
                .await?
                .with_raw_table(&config.raw_table)?;
            Ok(Stores::from_single(Arc::new(store)))
        },
        #[cfg(not(feature = "database"))]
        StoreBackend::Postgres => {
            bail!("this binary was built without the `database` feature")
        },
        StoreBackend::Memory => Ok(Stores::from_single(Arc::new(InMemoryStore::new()))),
    }
}

fn load_config(backend: Option<StoreBackend>, raw_table: Option<String>) -> Result<IngestConfig> {
    let mut config = IngestConfig::load_env().context("Invalid ingestion configuration")?;
    if let Some(backend) = backend {
        config.backend = backend;
    }
    if let Some(raw_table) = raw_table {
        config.raw_table = raw_table;
    }
    config.validate().context("Invalid ingestion configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("zykor-ingest")
        .filter_directives("hyper=warn,reqwest=info,sqlx=warn")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let registry = Arc::new(SchemaRegistry::builtin()?);

    match cli.command {
        Command::Process {
            raw_capture_id,
            batch_size,
            backend,
            raw_table,
            skip_processed,
            full,
        } => {
            let config = load_config(backend, raw_table)?;
            let stores = connect(&config).await?;
            let mut settings = config.pipeline_settings();
            settings.skip_processed |= skip_processed;

            let orchestrator =
                IngestionOrchestrator::new(settings, registry, stores.state, stores.target);
            let mut request = InvocationRequest::new(raw_capture_id);
            request.batch_size = batch_size;
            let outcome = orchestrator.run(request).await?;

            if full {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", serde_json::to_string(&outcome.summary())?);
            }
        },
        Command::Replay {
            file,
            data_type,
            tenant_id,
            md5,
            batch_size,
        } => {
            let capture = load_replay_file(
                &file,
                md5.as_deref(),
                BarePayloadContext {
                    data_type,
                    tenant_id,
                },
            )
            .with_context(|| format!("Failed to load replay file {}", file.display()))?;
            let raw_capture_id = capture.id;
            info!(raw_capture_id, data_type = %capture.data_type, "Replaying capture file");

            let store = Arc::new(InMemoryStore::new());
            store.insert_capture(capture);
            let mut settings = IngestConfig::default().pipeline_settings();
            settings.writer.pacing_delay = std::time::Duration::ZERO;

            let orchestrator =
                IngestionOrchestrator::new(settings, registry, store.clone(), store);
            let mut request = InvocationRequest::new(raw_capture_id);
            request.batch_size = batch_size;
            let outcome = orchestrator.run(request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        },
        Command::Capture {
            url,
            tenant_id,
            data_type,
            data_date,
            items_field,
            bearer_token,
            process,
        } => {
            let descriptor = registry.get(&data_type)?;
            let config = load_config(None, None)?;
            let stores = connect(&config).await?;

            let mut source = HttpPageSource::new(url, config.http_timeout())?;
            if let Some(field) = items_field {
                source = source.with_items_field(field);
            }
            if let Some(token) = bearer_token {
                source = source.with_bearer_token(token);
            }

            let receipt = CaptureProducer::new(Arc::new(source), stores.sink)
                .with_limits(config.pagination())
                .with_container(descriptor.container.clone())
                .capture(tenant_id, &data_type, data_date)
                .await?;

            if process {
                let orchestrator = IngestionOrchestrator::new(
                    config.pipeline_settings(),
                    registry,
                    stores.state,
                    stores.target,
                );
                let outcome = orchestrator
                    .run(InvocationRequest::new(receipt.raw_capture_id))
                    .await?;
                println!("{}", serde_json::to_string(&outcome.summary())?);
            } else {
                println!(
                    "{}",
                    serde_json::json!({
                        "raw_capture_id": receipt.raw_capture_id,
                        "record_count": receipt.record_count,
                        "pages": receipt.pages,
                        "truncated": receipt.truncated,
                    })
                );
            }
        },
        Command::DataTypes => {
            for data_type in registry.data_types() {
                let descriptor = registry.get(data_type)?;
                println!(
                    "{:<14} {:<22} batch={}",
                    data_type, descriptor.table, descriptor.batch_size
                );
            }
        },
    }

    Ok(())
}
