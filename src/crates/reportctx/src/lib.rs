//! reportctx - Checkpointed batch jobs over BI report catalogs
//!
//! Adds LLM-generated business context, Metabase usage statistics and card
//! metadata to report catalogs. Each job is resumable: completed reports
//! are read back from the result store on start and never reprocessed.
//!
//! - [`config`] - layered TOML configuration
//! - [`catalog`] - catalog row schemas
//! - [`jobs`] - job plans and the per-item processors
//! - [`discover`] - new catalogs from recently used Metabase cards
//! - [`mapping`] - positional result keys mapped back to card ids
//! - [`cli`] - command handlers for the binary

pub mod catalog;
pub mod cli;
pub mod config;
pub mod discover;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod mapping;
pub mod progress;

pub use config::{load_config, ConfigLoader, ReportctxConfig};
pub use error::{ReportctxError, Result};
pub use jobs::{JobKind, JobPlan, RunOverrides};
pub use logging::init_logging;

/// Version string for `--version` output and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
