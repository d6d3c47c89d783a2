//! Error types for Metabase lookups.

use thiserror::Error;

/// Result type for Metabase operations.
pub type Result<T> = std::result::Result<T, MetabaseError>;

/// Errors that can occur while talking to Metabase.
///
/// A missing card is not an error: lookups return `Ok(None)` for 404.
#[derive(Debug, Error)]
pub enum MetabaseError {
    /// HTTP error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API key was rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Non-success status other than 404 or auth failures.
    #[error("Metabase API error {status}: {body}")]
    ApiError { status: u16, body: String },

    /// Request timed out.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MetabaseError {
    /// Transient errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            MetabaseError::HttpError(e) => e.is_timeout() || e.is_connect(),
            MetabaseError::ApiError { status, .. } => *status >= 500 || *status == 429,
            MetabaseError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for MetabaseError {
    fn from(err: serde_json::Error) -> Self {
        MetabaseError::SerializationError(err.to_string())
    }
}
