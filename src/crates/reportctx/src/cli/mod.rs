//! CLI command implementations
//!
//! Provides command handlers for the reportctx binary.

pub mod discover;
pub mod helpers;
pub mod run;
pub mod status;

pub use discover::{handle_discover, handle_map, DiscoverOverrides};
pub use run::{handle_run, RunOptions};
pub use status::{handle_gaps, handle_status};
