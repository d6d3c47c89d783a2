//! Error types for reportctx
//!
//! Provides a unified error type for configuration, catalog, store and
//! service-client failures surfaced to the operator.

use std::fmt;

/// Result type alias for reportctx operations
pub type Result<T> = std::result::Result<T, ReportctxError>;

/// Main error type for reportctx operations
#[derive(Debug)]
pub enum ReportctxError {
    /// Configuration error
    Config(String),

    /// Catalog, ledger or store failure from the checkpoint layer
    Checkpoint(batch_checkpoint::CheckpointError),

    /// Summarization service error
    Llm(llm::LlmError),

    /// Lookup service error
    Metabase(metabase_client::MetabaseError),

    /// Operator declined to start the run
    Aborted,

    /// IO error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serde(serde_json::Error),

    /// Generic error with message
    Other(String),
}

impl ReportctxError {
    /// Catalog or result-store problems found before any processing starts.
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Self::Checkpoint(e) if e.is_fatal_on_startup())
    }
}

impl fmt::Display for ReportctxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Checkpoint(err) => write!(f, "{}", err),
            Self::Llm(err) => write!(f, "LLM error: {}", err),
            Self::Metabase(err) => write!(f, "Metabase error: {}", err),
            Self::Aborted => write!(f, "Run aborted by operator"),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Serde(err) => write!(f, "Serialization error: {}", err),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ReportctxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Checkpoint(err) => Some(err),
            Self::Llm(err) => Some(err),
            Self::Metabase(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            _ => None,
        }
    }
}

impl From<batch_checkpoint::CheckpointError> for ReportctxError {
    fn from(err: batch_checkpoint::CheckpointError) -> Self {
        Self::Checkpoint(err)
    }
}

impl From<llm::LlmError> for ReportctxError {
    fn from(err: llm::LlmError) -> Self {
        Self::Llm(err)
    }
}

impl From<metabase_client::MetabaseError> for ReportctxError {
    fn from(err: metabase_client::MetabaseError) -> Self {
        Self::Metabase(err)
    }
}

impl From<std::io::Error> for ReportctxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ReportctxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}

impl From<String> for ReportctxError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for ReportctxError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
