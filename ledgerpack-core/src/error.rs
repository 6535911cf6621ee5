/*!
Error types for the ledgerpack core engine.
*/

use thiserror::Error;

/// Result type used throughout the ledgerpack core.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can occur during backup import/export operations.
///
/// Row-level problems never surface here: a row that fails to decode or
/// validate is recorded as a [`FailedRow`](crate::result::FailedRow) inside
/// an otherwise successful import result.
#[derive(Error, Debug)]
pub enum BackupError {
    /// I/O errors while reading a backup source or writing a destination
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document-level JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input is neither a backup document nor a recognized archive
    #[error("Unsupported backup format: {0}")]
    UnsupportedFormat(String),

    /// Declared schema version lies outside the supported range
    #[error("Unsupported schema version {version}: supported range is {oldest} to {current}")]
    UnsupportedVersion {
        version: String,
        oldest: u16,
        current: u16,
    },

    /// Manifest checksum did not match the document entry
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Archive container errors (corrupt entries, codec failures)
    #[error("Archive error: {0}")]
    Archive(String),

    /// Repository collaborator errors (batch write rejections, store faults)
    #[error("Repository error: {0}")]
    Repository(String),

    /// Validation errors for configuration and arguments
    #[error("Validation error: {0}")]
    Validation(String),
}

impl BackupError {
    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new repository error
    pub fn repository<S: Into<String>>(msg: S) -> Self {
        Self::Repository(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
}
