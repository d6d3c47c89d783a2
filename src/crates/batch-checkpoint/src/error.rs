//! Error types for checkpoint operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while loading, resolving, or persisting work.
///
/// Per-item processing failures are not represented here: they are
/// recorded as [`FailureRecord`](crate::FailureRecord)s and never abort a run.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The source catalog is missing, unreadable, or lacks required columns
    #[error("Catalog load failed for {path}: {reason}")]
    CatalogLoad { path: PathBuf, reason: String },

    /// The durable result store exists but cannot be parsed
    #[error("Result store {path} is corrupt: {reason}")]
    LedgerCorrupt { path: PathBuf, reason: String },

    /// A temp-write or rename failed while flushing a checkpoint
    #[error("Flush of {path} failed during {operation}: {source}")]
    Flush {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// An emergency backup could not be written
    #[error("Emergency backup in {dir} failed: {source}")]
    Backup {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A work key label did not match the configured key scheme
    #[error("Invalid work key '{0}'")]
    InvalidKey(String),

    /// Executor configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tabular encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    pub(crate) fn catalog(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CatalogLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LedgerCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that must abort a run before any processing.
    pub fn is_fatal_on_startup(&self) -> bool {
        matches!(self, Self::CatalogLoad { .. } | Self::LedgerCorrupt { .. })
    }
}
