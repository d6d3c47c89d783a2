//! The single-prompt text generation seam used by batch jobs.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns one prompt into one block of text.
///
/// A content-policy refusal is reported as
/// [`LlmError::ContentBlocked`](crate::LlmError::ContentBlocked) so callers
/// can record it separately from transport or service failures.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logs and result provenance.
    fn model(&self) -> &str;
}

#[async_trait]
impl<T: Summarizer + ?Sized> Summarizer for &T {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        (**self).summarize(prompt).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

#[async_trait]
impl<T: Summarizer + ?Sized> Summarizer for Arc<T> {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        (**self).summarize(prompt).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}
