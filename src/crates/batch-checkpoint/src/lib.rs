//! # batch-checkpoint - Incremental checkpoint and recovery for batch work
//!
//! Runs a long queue of slow, rate-limited, failure-prone external calls
//! (one per work item) so that an interrupted or crashed run can be resumed
//! without redoing completed work and without losing more than a bounded
//! amount of it.
//!
//! ## Components
//!
//! - [`WorkCatalog`] / [`CsvCatalog`] - enumerate the universe of work items
//! - [`CompletionLedger`] - reconstruct the set of durably completed keys
//! - [`gaps`] - catalog minus ledger, plus human-readable range summaries
//! - [`CheckpointedExecutor`] - process the queue, flush every K items
//! - [`CheckpointStore`] / [`FileStore`] - atomic, crash-consistent persistence
//! - [`ShutdownCoordinator`] - turn signals into a cooperative stop
//! - [`EmergencyBackup`] - write-once dumps of uncommitted work
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use batch_checkpoint::{
//!     CheckpointedExecutor, CompletionLedger, CsvCatalog, ExecutorConfig, Fields,
//!     FileStore, ItemFailure, ItemProcessor, KeySource, ShutdownCoordinator, StoreLayout,
//!     WorkCatalog, WorkItem,
//! };
//! use std::collections::HashMap;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ItemProcessor<HashMap<String, String>> for Echo {
//!     async fn process(
//!         &self,
//!         item: &WorkItem<HashMap<String, String>>,
//!     ) -> Result<Fields, ItemFailure> {
//!         Ok(item.payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = CsvCatalog::<HashMap<String, String>>::new("reports.csv", KeySource::Position);
//!     let items = catalog.enumerate()?;
//!
//!     let store = FileStore::new(StoreLayout::new("out", "echo"));
//!     let (ledger, mut state) = CompletionLedger::load(&store).await?;
//!
//!     let report = ledger.gap_report(items.iter().map(|i| i.key));
//!     println!("{} (missing: {})", report, report.missing_ranges());
//!
//!     let catalog: Vec<_> = items.iter().map(|i| i.key).collect();
//!     let queue: Vec<_> = items
//!         .into_iter()
//!         .filter(|i| !ledger.is_completed(i.key))
//!         .collect();
//!
//!     let executor =
//!         CheckpointedExecutor::new(ExecutorConfig::default(), store, ShutdownCoordinator::new())?;
//!     let run = executor.run(queue, &mut state, &Echo, catalog).await?;
//!     println!("{} newly completed", run.newly_completed);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - A key counts as completed only once its result is in the committed
//!   results table; failures never count.
//! - The results table holds at most one row per key.
//! - A crash loses at most the items attempted since the last flush.
//! - A flush either fully replaces the results table or leaves every table
//!   untouched.
//! - Completion figures count catalog keys only.

pub mod atomic;
pub mod backup;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod gaps;
pub mod item;
pub mod ledger;
pub mod pacer;
pub mod progress;
pub mod record;
pub mod shutdown;
pub mod store;

pub use atomic::{atomic_write, atomic_write_with, StagedFile};
pub use backup::EmergencyBackup;
pub use catalog::{CsvCatalog, KeySource, WorkCatalog};
pub use error::{CheckpointError, Result};
pub use executor::{CheckpointedExecutor, ExecutorConfig, ItemProcessor, RunReport};
pub use gaps::{compress_ranges, GapReport};
pub use item::{KeyScheme, WorkItem, WorkKey};
pub use ledger::CompletionLedger;
pub use pacer::Pacer;
pub use progress::{ItemOutcome, NoopProgress, ProgressObserver, ProgressUpdate, TracingProgress};
pub use record::{
    CheckpointState, FailureKind, FailureRecord, Fields, ItemFailure, ResultRecord,
};
pub use shutdown::ShutdownCoordinator;
pub use store::{CheckpointStore, FileStore, FlushContext, StateHint, StoreLayout, StoredSnapshot};
