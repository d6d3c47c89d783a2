//! LLM provider implementations for reportctx.
//!
//! The batch jobs only ever need "prompt in, text out", so this crate exposes
//! a single [`Summarizer`] trait and a Google Gemini implementation of it.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use llm::remote::GeminiClient;
//! use llm::{RemoteLlmConfig, Summarizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env(
//!         "GEMINI_API_KEY",
//!         "https://generativelanguage.googleapis.com/v1beta",
//!         "gemini-2.5-pro",
//!     )?;
//!     let client = GeminiClient::new(config)?;
//!
//!     match client.summarize("What does this query measure? SELECT ...").await {
//!         Ok(text) => println!("{}", text),
//!         Err(e) if e.is_content_blocked() => println!("refused: {}", e),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod summarizer;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export commonly used types
pub use config::{GenerationSettings, RemoteLlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{LlmError, Result};
pub use summarizer::Summarizer;
