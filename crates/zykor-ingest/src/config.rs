//! Ingestion configuration
//!
//! Built once from the environment (a `.env` file is honoured) and passed
//! explicitly into the stores and the orchestrator.
//!
//! | Variable | Default |
//! |---|---|
//! | `INGEST_BACKEND` | `rest` (`rest`, `postgres`, `memory`) |
//! | `INGEST_RAW_TABLE` | `contahub_raw_data` |
//! | `INGEST_WRITE_CEILING` | `1000` |
//! | `INGEST_PACING_DELAY_MS` | `100` |
//! | `INGEST_HTTP_TIMEOUT_SECS` | `60` |
//! | `INGEST_SKIP_PROCESSED` | `false` |
//! | `INGEST_PAGE_SIZE` | `500` |
//! | `INGEST_MAX_PAGES` | `50` |
//! | `DATABASE_URL` | required for `postgres` |
//! | `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY` | required for `rest` |

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::capture::{PaginationLimits, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::error::{IngestError, Result};
use crate::store::{validate_identifier, DEFAULT_RAW_TABLE};
use crate::store::rest::DEFAULT_REST_TIMEOUT_SECS;
use crate::writer::{WriterSettings, DEFAULT_PACING_DELAY, DEFAULT_WRITE_CEILING};

/// Which store implementation backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Rest,
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rest" | "supabase" => Ok(StoreBackend::Rest),
            "postgres" | "postgresql" | "database" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(IngestError::InvalidInput(format!(
                "unknown backend '{other}', expected rest, postgres or memory"
            ))),
        }
    }
}

/// Orchestrator knobs derived from [`IngestConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub writer: WriterSettings,
    /// Return early for captures already marked processed
    pub skip_processed: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            writer: WriterSettings::default(),
            skip_processed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub supabase_url: Option<String>,
    #[serde(skip_serializing)]
    pub supabase_key: Option<String>,
    pub raw_table: String,
    pub write_ceiling: usize,
    pub pacing_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub skip_processed: bool,
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            supabase_url: None,
            supabase_key: None,
            raw_table: DEFAULT_RAW_TABLE.to_string(),
            write_ceiling: DEFAULT_WRITE_CEILING,
            pacing_delay_ms: DEFAULT_PACING_DELAY.as_millis() as u64,
            http_timeout_secs: DEFAULT_REST_TIMEOUT_SECS,
            skip_processed: false,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl IngestConfig {
    /// Load from environment variables (and `.env`), then validate
    pub fn from_env() -> Result<Self> {
        let config = Self::load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables without validating, so callers can
    /// apply overrides first
    pub fn load_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            backend: match non_empty_var("INGEST_BACKEND") {
                Some(value) => value.parse()?,
                None => defaults.backend,
            },
            database_url: non_empty_var("DATABASE_URL"),
            supabase_url: non_empty_var("SUPABASE_URL"),
            supabase_key: non_empty_var("SUPABASE_SERVICE_ROLE_KEY"),
            raw_table: non_empty_var("INGEST_RAW_TABLE").unwrap_or(defaults.raw_table),
            write_ceiling: parse_var("INGEST_WRITE_CEILING", defaults.write_ceiling)?,
            pacing_delay_ms: parse_var("INGEST_PACING_DELAY_MS", defaults.pacing_delay_ms)?,
            http_timeout_secs: parse_var("INGEST_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            skip_processed: parse_var("INGEST_SKIP_PROCESSED", defaults.skip_processed)?,
            page_size: parse_var("INGEST_PAGE_SIZE", defaults.page_size)?,
            max_pages: parse_var("INGEST_MAX_PAGES", defaults.max_pages)?,
        };
        Ok(config)
    }

    /// Check that the selected backend has what it needs
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StoreBackend::Rest => {
                if self.supabase_url.is_none() {
                    return Err(IngestError::MissingConfiguration("SUPABASE_URL".into()));
                }
                if self.supabase_key.is_none() {
                    return Err(IngestError::MissingConfiguration(
                        "SUPABASE_SERVICE_ROLE_KEY".into(),
                    ));
                }
            },
            StoreBackend::Postgres => {
                if self.database_url.is_none() {
                    return Err(IngestError::MissingConfiguration("DATABASE_URL".into()));
                }
            },
            StoreBackend::Memory => {},
        }

        validate_identifier(&self.raw_table)?;
        if self.write_ceiling == 0 {
            return Err(IngestError::InvalidInput(
                "INGEST_WRITE_CEILING must be greater than 0".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(IngestError::InvalidInput(
                "INGEST_HTTP_TIMEOUT_SECS must be greater than 0".into(),
            ));
        }
        self.pagination().effective_page_size()?;
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            writer: WriterSettings {
                write_ceiling: self.write_ceiling,
                pacing_delay: Duration::from_millis(self.pacing_delay_ms),
            },
            skip_processed: self.skip_processed,
        }
    }

    pub fn pagination(&self) -> PaginationLimits {
        PaginationLimits {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IngestError::InvalidInput(format!("{name} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "INGEST_BACKEND",
        "INGEST_RAW_TABLE",
        "INGEST_WRITE_CEILING",
        "INGEST_PACING_DELAY_MS",
        "INGEST_HTTP_TIMEOUT_SECS",
        "INGEST_SKIP_PROCESSED",
        "INGEST_PAGE_SIZE",
        "INGEST_MAX_PAGES",
        "DATABASE_URL",
        "SUPABASE_URL",
        "SUPABASE_SERVICE_ROLE_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_memory_backend_needs_nothing() {
        clear_env();
        std::env::set_var("INGEST_BACKEND", "memory");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.write_ceiling, DEFAULT_WRITE_CEILING);
        assert_eq!(config.pipeline_settings().writer.pacing_delay, DEFAULT_PACING_DELAY);
        assert!(!config.skip_processed);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_rest_backend_requires_credentials() {
        clear_env();
        std::env::set_var("INGEST_BACKEND", "rest");
        std::env::set_var("SUPABASE_URL", "https://example.supabase.co");

        assert!(matches!(
            IngestConfig::from_env(),
            Err(IngestError::MissingConfiguration(v)) if v == "SUPABASE_SERVICE_ROLE_KEY"
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_postgres_backend_requires_database_url() {
        clear_env();
        std::env::set_var("INGEST_BACKEND", "postgres");

        assert!(matches!(
            IngestConfig::from_env(),
            Err(IngestError::MissingConfiguration(v)) if v == "DATABASE_URL"
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides_and_invalid_values() {
        clear_env();
        std::env::set_var("INGEST_BACKEND", "memory");
        std::env::set_var("INGEST_WRITE_CEILING", "250");
        std::env::set_var("INGEST_SKIP_PROCESSED", "true");
        std::env::set_var("INGEST_RAW_TABLE", "nibo_raw_data");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.pipeline_settings().writer.write_ceiling, 250);
        assert!(config.pipeline_settings().skip_processed);
        assert_eq!(config.raw_table, "nibo_raw_data");

        std::env::set_var("INGEST_WRITE_CEILING", "lots");
        assert!(matches!(IngestConfig::from_env(), Err(IngestError::InvalidInput(_))));

        std::env::set_var("INGEST_WRITE_CEILING", "0");
        assert!(IngestConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Supabase".parse::<StoreBackend>().unwrap(), StoreBackend::Rest);
        assert_eq!("postgresql".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!("mysql".parse::<StoreBackend>().is_err());
    }
}
