//! Error types shared by Zykor crates

use thiserror::Error;

/// Result type alias for Zykor operations
pub type Result<T> = std::result::Result<T, ZykorError>;

/// Main error type for shared Zykor utilities
#[derive(Error, Debug)]
pub enum ZykorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
