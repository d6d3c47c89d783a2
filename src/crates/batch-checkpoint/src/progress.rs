//! Progress reporting hooks for the executor.

use crate::executor::RunReport;
use crate::item::WorkKey;
use crate::record::FailureKind;
use std::time::Duration;
use tracing::info;

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed(FailureKind),
}

/// Snapshot emitted after every attempted item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub key: WorkKey,
    pub outcome: ItemOutcome,
    /// Items attempted so far in this run.
    pub attempted: usize,
    /// Items still queued in this run.
    pub remaining: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl ProgressUpdate {
    /// Remaining time from the mean wall time per attempted item.
    pub fn eta(&self) -> Option<Duration> {
        if self.attempted == 0 {
            return None;
        }
        let per_item = self.elapsed.as_secs_f64() / self.attempted as f64;
        Some(Duration::from_secs_f64(per_item * self.remaining as f64))
    }
}

/// Receives executor progress. All methods default to no-ops.
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _queued: usize) {}

    fn on_item(&self, _update: &ProgressUpdate) {}

    fn on_checkpoint(&self, _checkpoint: u64, _committed: usize) {}

    fn on_finish(&self, _report: &RunReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}

/// Observer that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_start(&self, queued: usize) {
        info!(queued = queued, "Run started");
    }

    fn on_item(&self, update: &ProgressUpdate) {
        info!(
            key = %update.key,
            outcome = ?update.outcome,
            attempted = update.attempted,
            remaining = update.remaining,
            succeeded = update.succeeded,
            failed = update.failed,
            eta_secs = update.eta().map(|d| d.as_secs()),
            "Item processed"
        );
    }

    fn on_checkpoint(&self, checkpoint: u64, committed: usize) {
        info!(checkpoint = checkpoint, committed = committed, "Checkpoint saved");
    }

    fn on_finish(&self, report: &RunReport) {
        info!(
            newly_completed = report.newly_completed,
            newly_failed = report.newly_failed,
            interrupted = report.interrupted,
            committed = report.committed,
            "Run finished"
        );
    }
}
