//! Checkpointed executor: drives a processor over the remaining work.
//!
//! The executor owns the only mutable copy of [`CheckpointState`] during a
//! run. Every K attempted items it hands a snapshot of that state to the
//! [`CheckpointStore`]; a crash therefore loses at most the items attempted
//! since the last successful flush.
//!
//! ```text
//!  queue ──▶ buffer_unordered(workers) ──▶ consumer ──▶ state ──every K──▶ store.flush
//!               │  pacer.wait()                │
//!               │  timeout(process)            └─ on flush error: emergency backup
//!               └─ catch_unwind
//! ```
//!
//! A flush holds the write side of the flush gate and every attempt passes
//! the read side before it starts, so no new item starts until the flush
//! completes. Attempts already in flight keep being polled during the flush
//! and their outcomes are applied once it returns, so a slow flush never
//! eats into their timeouts.

use crate::backup::EmergencyBackup;
use crate::error::{CheckpointError, Result};
use crate::item::{WorkItem, WorkKey};
use crate::pacer::Pacer;
use crate::progress::{ItemOutcome, NoopProgress, ProgressObserver, ProgressUpdate};
use crate::record::{
    CheckpointState, FailureKind, FailureRecord, Fields, ItemFailure, ResultRecord,
};
use crate::shutdown::ShutdownCoordinator;
use crate::store::{CheckpointStore, FlushContext};
use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, FutureExt, Stream, StreamExt};
use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-item work performed against an external service.
///
/// Failures are data: return an [`ItemFailure`] and the executor records it
/// and moves on.
#[async_trait]
pub trait ItemProcessor<P: Send + Sync>: Send + Sync {
    async fn process(&self, item: &WorkItem<P>) -> std::result::Result<Fields, ItemFailure>;
}

/// Executor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Flush after this many attempted items (K).
    pub checkpoint_every: usize,
    /// Minimum spacing between processing calls, across all workers.
    pub min_call_interval: Duration,
    /// Upper bound for one processing call.
    pub item_timeout: Duration,
    /// Concurrent processing calls. 1 means strictly sequential.
    pub workers: usize,
    /// Stop after this many items from the queue.
    pub batch_limit: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 5,
            min_call_interval: Duration::from_millis(1500),
            item_timeout: Duration::from_secs(120),
            workers: 1,
            batch_limit: None,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_every == 0 {
            return Err(CheckpointError::Config(
                "checkpoint_every must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(CheckpointError::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.item_timeout.is_zero() {
            return Err(CheckpointError::Config(
                "item_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub catalog_total: usize,
    /// Catalog keys already in the store when the run started.
    pub previously_completed: usize,
    pub attempted: usize,
    pub newly_completed: usize,
    pub newly_failed: usize,
    /// Queued items never attempted because of shutdown.
    pub skipped: usize,
    pub interrupted: bool,
    pub checkpoints_written: usize,
    pub flush_failures: usize,
    pub emergency_backups: Vec<PathBuf>,
    /// False if work from this run is not in the durable store.
    pub committed: bool,
    pub store_path: PathBuf,
    /// Catalog keys in the store at the end of the run. Stored rows for
    /// keys outside the catalog are kept but never counted.
    pub total_completed: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn completion_pct(&self) -> f64 {
        if self.catalog_total == 0 {
            100.0
        } else {
            (self.total_completed as f64 / self.catalog_total as f64 * 100.0).min(100.0)
        }
    }
}

enum Attempt {
    Done(WorkKey, std::result::Result<Fields, ItemFailure>),
    Panicked(WorkKey, String),
    Skipped,
}

/// Records accumulated since the last committed checkpoint.
#[derive(Default)]
struct Uncommitted {
    results: Vec<ResultRecord>,
    failures: Vec<FailureRecord>,
    attempts: usize,
}

impl Uncommitted {
    fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }

    fn clear(&mut self) {
        self.results.clear();
        self.failures.clear();
    }
}

/// Runs a queue of work through an [`ItemProcessor`] with periodic durable
/// checkpoints. Construct one per run.
pub struct CheckpointedExecutor<S> {
    config: ExecutorConfig,
    store: S,
    shutdown: ShutdownCoordinator,
    pacer: Pacer,
    backup: EmergencyBackup,
    observer: Arc<dyn ProgressObserver>,
    flush_gate: tokio::sync::RwLock<()>,
}

impl<S: CheckpointStore> CheckpointedExecutor<S> {
    pub fn new(config: ExecutorConfig, store: S, shutdown: ShutdownCoordinator) -> Result<Self> {
        config.validate()?;
        let backup = EmergencyBackup::new(store.backup_dir());
        Ok(Self {
            pacer: Pacer::new(config.min_call_interval),
            config,
            store,
            shutdown,
            backup,
            observer: Arc::new(NoopProgress),
            flush_gate: tokio::sync::RwLock::new(()),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process `queue` on top of `state`, flushing every K attempted items
    /// and once more at the end.
    ///
    /// `catalog_keys` is the whole catalog, not just the queue; completion
    /// figures count only these keys. Per-item failures never abort the run.
    /// The returned report says whether the final state reached the store.
    pub async fn run<P, Proc, I>(
        &self,
        queue: Vec<WorkItem<P>>,
        state: &mut CheckpointState,
        processor: &Proc,
        catalog_keys: I,
    ) -> Result<RunReport>
    where
        P: Send + Sync,
        Proc: ItemProcessor<P> + ?Sized,
        I: IntoIterator<Item = WorkKey>,
    {
        let started = Instant::now();
        let catalog: BTreeSet<WorkKey> = catalog_keys.into_iter().collect();
        let catalog_total = catalog.len();
        let previously_completed = completed_in(&catalog, state);

        let mut queue: Vec<WorkItem<P>> = queue
            .into_iter()
            .filter(|item| {
                let done = state.is_completed(item.key);
                if done {
                    debug!(key = %item.key, "Already completed, not queued");
                }
                !done
            })
            .collect();
        if let Some(limit) = self.config.batch_limit {
            queue.truncate(limit);
        }
        let queued = queue.len();

        info!(
            queued = queued,
            catalog_total = catalog_total,
            previously_completed = previously_completed,
            workers = self.config.workers,
            checkpoint_every = self.config.checkpoint_every,
            "Starting checkpointed run"
        );
        self.observer.on_start(queued);

        let mut report = RunReport {
            catalog_total,
            previously_completed,
            attempted: 0,
            newly_completed: 0,
            newly_failed: 0,
            skipped: 0,
            interrupted: false,
            checkpoints_written: 0,
            flush_failures: 0,
            emergency_backups: Vec::new(),
            committed: true,
            store_path: self.store.location(),
            total_completed: previously_completed,
            elapsed: Duration::ZERO,
        };
        let mut pending = Uncommitted::default();
        let mut parked: VecDeque<Attempt> = VecDeque::new();

        let mut attempts = stream::iter(queue.iter())
            .map(|item| self.attempt(item, processor))
            .buffer_unordered(self.config.workers);

        loop {
            let attempt = match parked.pop_front() {
                Some(attempt) => attempt,
                None => match attempts.next().await {
                    Some(attempt) => attempt,
                    None => break,
                },
            };

            let (key, outcome) = match attempt {
                Attempt::Skipped => {
                    report.skipped += 1;
                    continue;
                }
                Attempt::Done(key, Ok(fields)) => {
                    let record = ResultRecord::new(key, fields);
                    if state.record_success(record.clone()) {
                        report.newly_completed += 1;
                    }
                    pending.results.push(record);
                    (key, ItemOutcome::Succeeded)
                }
                Attempt::Done(key, Err(failure)) => {
                    let kind = failure.kind;
                    self.record_failure(state, &mut pending, &mut report, key, failure);
                    (key, ItemOutcome::Failed(kind))
                }
                Attempt::Panicked(key, message) => {
                    error!(key = %key, panic = %message, "Processor panicked");
                    let failure = ItemFailure::new(
                        FailureKind::Unexpected,
                        format!("processor panicked: {}", message),
                    );
                    self.record_failure(state, &mut pending, &mut report, key, failure);
                    let reason = format!("processor panic on key {}", key);
                    self.emergency_backup(&reason, &pending, &mut report).await;
                    (key, ItemOutcome::Failed(FailureKind::Unexpected))
                }
            };

            report.attempted += 1;
            pending.attempts += 1;

            self.observer.on_item(&ProgressUpdate {
                key,
                outcome,
                attempted: report.attempted,
                remaining: queued.saturating_sub(report.attempted + report.skipped),
                succeeded: report.newly_completed,
                failed: report.newly_failed,
                elapsed: started.elapsed(),
            });

            if pending.attempts >= self.config.checkpoint_every {
                pending.attempts = 0;
                let flush = self.checkpoint(
                    state,
                    &catalog,
                    &mut pending,
                    &mut report,
                    "checkpoint flush failed",
                );
                poll_during(flush, &mut attempts, &mut parked).await;
            }
        }
        drop(attempts);

        if self.shutdown.is_shutdown_requested() {
            report.interrupted = true;
            warn!(
                attempted = report.attempted,
                skipped = report.skipped,
                "Run interrupted, saving progress"
            );
            if !pending.is_empty() {
                self.emergency_backup("interrupted", &pending, &mut report).await;
            }
        }

        if !pending.is_empty() {
            report.committed = self
                .checkpoint(state, &catalog, &mut pending, &mut report, "final flush failed")
                .await;
        } else {
            debug!("Nothing new to save, store left untouched");
        }

        report.total_completed = completed_in(&catalog, state);
        report.elapsed = started.elapsed();
        self.observer.on_finish(&report);

        info!(
            newly_completed = report.newly_completed,
            newly_failed = report.newly_failed,
            skipped = report.skipped,
            checkpoints = report.checkpoints_written,
            committed = report.committed,
            completion_pct = report.completion_pct(),
            "Run complete"
        );
        Ok(report)
    }

    async fn attempt<P, Proc>(&self, item: &WorkItem<P>, processor: &Proc) -> Attempt
    where
        P: Send + Sync,
        Proc: ItemProcessor<P> + ?Sized,
    {
        if self.shutdown.is_shutdown_requested() {
            return Attempt::Skipped;
        }
        drop(self.flush_gate.read().await);
        tokio::select! {
            biased;
            _ = self.shutdown.wait_for_shutdown() => return Attempt::Skipped,
            _ = self.pacer.wait() => {}
        }
        if self.shutdown.is_shutdown_requested() {
            return Attempt::Skipped;
        }

        debug!(key = %item.key, "Processing item");
        let call = AssertUnwindSafe(processor.process(item)).catch_unwind();

        match tokio::time::timeout(self.config.item_timeout, call).await {
            Ok(Ok(outcome)) => Attempt::Done(item.key, outcome),
            Ok(Err(panic)) => Attempt::Panicked(item.key, panic_message(panic.as_ref())),
            Err(_) => Attempt::Done(
                item.key,
                Err(ItemFailure::new(
                    FailureKind::Timeout,
                    format!("no response within {}s", self.config.item_timeout.as_secs_f64()),
                )),
            ),
        }
    }

    fn record_failure(
        &self,
        state: &mut CheckpointState,
        pending: &mut Uncommitted,
        report: &mut RunReport,
        key: WorkKey,
        failure: ItemFailure,
    ) {
        warn!(key = %key, kind = %failure.kind, detail = %failure.detail, "Item failed");
        let record = FailureRecord::from_failure(key, failure);
        if state.record_failure(record.clone()) {
            report.newly_failed += 1;
            pending.failures.push(record);
        }
    }

    /// Flush the full state. Returns true if the store now holds it.
    async fn checkpoint(
        &self,
        state: &mut CheckpointState,
        catalog: &BTreeSet<WorkKey>,
        pending: &mut Uncommitted,
        report: &mut RunReport,
        backup_reason: &str,
    ) -> bool {
        if pending.is_empty() {
            return true;
        }

        let _gate = self.flush_gate.write().await;
        let context = FlushContext {
            checkpoint: state.checkpoint + 1,
            saved_at: Utc::now(),
            catalog_total: report.catalog_total,
            catalog_completed: completed_in(catalog, state),
            checkpoint_every: self.config.checkpoint_every,
        };

        match self.store.flush(state, &context).await {
            Ok(()) => {
                state.checkpoint = context.checkpoint;
                state.last_saved = Some(context.saved_at);
                pending.clear();
                report.checkpoints_written += 1;
                self.observer
                    .on_checkpoint(context.checkpoint, context.catalog_completed);
                true
            }
            Err(e) => {
                report.flush_failures += 1;
                error!(
                    error = %e,
                    checkpoint = context.checkpoint,
                    "Checkpoint flush failed, keeping work in memory"
                );
                self.emergency_backup(backup_reason, pending, report).await;
                false
            }
        }
    }

    async fn emergency_backup(&self, reason: &str, pending: &Uncommitted, report: &mut RunReport) {
        match self
            .backup
            .write(reason, &pending.results, &pending.failures)
            .await
        {
            Ok(path) => report.emergency_backups.push(path),
            Err(e) => error!(error = %e, reason = reason, "Emergency backup failed"),
        }
    }
}

/// Drive `flush` to completion while still polling attempts already in
/// flight. Their outcomes wait in `parked` until the caller is free.
async fn poll_during<F, St>(flush: F, attempts: &mut St, parked: &mut VecDeque<Attempt>) -> F::Output
where
    F: Future,
    St: Stream<Item = Attempt> + Unpin,
{
    tokio::pin!(flush);
    let mut exhausted = false;
    loop {
        tokio::select! {
            biased;
            output = &mut flush => return output,
            next = attempts.next(), if !exhausted => match next {
                Some(attempt) => parked.push_back(attempt),
                None => exhausted = true,
            },
        }
    }
}

fn completed_in(catalog: &BTreeSet<WorkKey>, state: &CheckpointState) -> usize {
    catalog.iter().filter(|key| state.is_completed(**key)).count()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
