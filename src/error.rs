//! Error types for metadata operations.
//!
//! Every fallible library call returns [`MetadataError`]. Low-level codec and
//! parser failures are wrapped into the `Read`/`Write` kinds at the adapter
//! boundary so callers never see raw decoder errors.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Top-level error type for all metadata operations.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// No adapter is registered for the file's extension or sniffed MIME type.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Metadata could not be read (codec or parse failure, cause embedded).
    #[error("Failed to read {format} metadata from {path}: {message}")]
    Read {
        format: &'static str,
        path: PathBuf,
        message: String,
    },

    /// Metadata could not be written or stripped.
    #[error("Failed to write {format} metadata to {path}: {message}")]
    Write {
        format: &'static str,
        path: PathBuf,
        message: String,
    },

    /// Post-write integrity verification failed. Always fatal to the
    /// operation; the safe-write guard has already rolled back.
    #[error("Pixel data integrity check failed for {path}: {message}")]
    PixelCorruption { path: PathBuf, message: String },

    /// File does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Path exists but is not a regular file.
    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    /// File exists but cannot be read.
    #[error("No read permission for file: {0}")]
    Permission(PathBuf),

    /// General I/O failure outside the kinds above.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backup creation or restoration failed. Fatal: callers rely on the
    /// backup for rollback safety.
    #[error("Backup operation failed: {0}")]
    Backup(String),

    /// Malformed configuration or metadata structure.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl MetadataError {
    /// Shorthand for wrapping a read-side cause.
    pub fn read(format: &'static str, path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            format,
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Shorthand for wrapping a write-side cause.
    pub fn write(format: &'static str, path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Write {
            format,
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
