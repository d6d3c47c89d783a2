//! Configuration management for reportctx
//!
//! Supports layered configuration:
//! - User-level: ~/.reportctx/reportctx.toml
//! - Project-level: ./reportctx.toml
//! - Explicit: `--config <path>`
//!
//! CLI flags are applied on top by the command handlers.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    CatalogConfig, DiscoverConfig, ExecutionConfig, LlmConfig, LoggingConfig, MappingConfig,
    MetabaseConfig, ReportctxConfig, StoreConfig,
};

use crate::Result;
use std::path::PathBuf;

/// Load configuration from every layer, with an optional explicit file on top
pub async fn load_config(explicit: Option<PathBuf>) -> Result<ReportctxConfig> {
    let loader = match explicit {
        Some(path) => ConfigLoader::new().with_explicit(path),
        None => ConfigLoader::new(),
    };
    loader.load().await
}
