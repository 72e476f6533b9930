//! Error and warning types shared across the catalog crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by node construction, indexing and probing.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path exists but is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Persisted index could not be decoded.
    #[error("Corrupt index file {path}: {source}")]
    CorruptIndex {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// File is not a probeable media file.
    #[error("Not valid media: {path}")]
    NotMedia { path: PathBuf },

    /// The external media probe failed to run or returned garbage.
    #[error("Media probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    /// The hashing worker pool could not be created.
    #[error("Failed to build worker pool: {message}")]
    ThreadPool { message: String },
}

impl CatalogError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether this error means the path no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Entry disappeared between listing and inspection.
    Vanished,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal warning encountered while walking a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Build a warning from a catalog error, picking the matching kind.
    pub fn from_error(path: impl Into<PathBuf>, error: &CatalogError) -> Self {
        let kind = match error {
            CatalogError::PermissionDenied { .. } => WarningKind::PermissionDenied,
            CatalogError::NotFound { .. } => WarningKind::Vanished,
            _ => WarningKind::MetadataError,
        };
        Self::new(path, error.to_string(), kind)
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: impl std::fmt::Display) -> Self {
        Self::new(path, format!("Read error: {error}"), WarningKind::ReadError)
    }
}
