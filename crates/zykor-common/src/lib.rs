//! Zykor Common Library
//!
//! Shared utilities and error handling for the Zykor ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `ZykorError` and the `Result` alias
//! - **Checksums**: MD5 fingerprints and checksum verification
//! - **Logging**: tracing subscriber setup driven by `LOG_*` variables
//!
//! # Example
//!
//! ```no_run
//! use zykor_common::checksum::compute_md5;
//! use zykor_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!(fingerprint = %compute_md5(b"bar-1"), "Ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, ZykorError};
