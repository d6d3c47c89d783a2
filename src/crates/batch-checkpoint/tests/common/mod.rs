//! Shared fixtures for executor scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use batch_checkpoint::{
    atomic_write_with, CheckpointError, CheckpointState, CheckpointStore, CheckpointedExecutor,
    ExecutorConfig, FailureKind, Fields, FileStore, FlushContext, ItemFailure, ItemProcessor,
    ShutdownCoordinator, StoreLayout, StoredSnapshot, WorkItem, WorkKey,
};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub fn items(n: u64) -> Vec<WorkItem<String>> {
    (1..=n)
        .map(|key| WorkItem::new(key, format!("Report {}", key)))
        .collect()
}

pub fn file_store(dir: &TempDir) -> FileStore {
    FileStore::new(StoreLayout::new(dir.path(), "reports").with_key_column("report_id"))
}

pub fn config(checkpoint_every: usize) -> ExecutorConfig {
    ExecutorConfig {
        checkpoint_every,
        min_call_interval: Duration::ZERO,
        item_timeout: Duration::from_secs(5),
        workers: 1,
        batch_limit: None,
    }
}

pub fn executor<S: CheckpointStore>(
    config: ExecutorConfig,
    store: S,
    shutdown: ShutdownCoordinator,
) -> CheckpointedExecutor<S> {
    CheckpointedExecutor::new(config, store, shutdown).unwrap()
}

pub fn keys(values: impl IntoIterator<Item = u64>) -> Vec<WorkKey> {
    values.into_iter().map(WorkKey::new).collect()
}

/// Processor whose behavior per key is scripted up front.
#[derive(Default)]
pub struct ScriptedProcessor {
    pub fail: HashSet<u64>,
    pub panic_on: HashSet<u64>,
    pub hang_on: HashSet<u64>,
    pub shutdown_on: Option<(u64, ShutdownCoordinator)>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Duration,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(keys: &[u64]) -> Self {
        Self {
            fail: keys.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemProcessor<String> for ScriptedProcessor {
    async fn process(&self, item: &WorkItem<String>) -> Result<Fields, ItemFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let key = item.key.get();
        if let Some((at, shutdown)) = &self.shutdown_on {
            if *at == key {
                shutdown.request_shutdown();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.hang_on.contains(&key) {
            std::future::pending::<()>().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.contains(&key) {
            panic!("processor exploded on {}", key);
        }
        if self.fail.contains(&key) {
            return Err(ItemFailure::new(FailureKind::ServiceError, "upstream returned 503")
                .with_context(item.payload.clone()));
        }
        Ok(Fields::new()
            .with("report_name", item.payload.clone())
            .with("summary", format!("summary of {}", item.payload)))
    }
}

/// Wraps a [`FileStore`] and fails chosen flushes partway through writing
/// the results table.
pub struct FlakyStore {
    pub inner: FileStore,
    pub fail_flushes: HashSet<usize>,
    pub flushes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: FileStore, fail_flushes: &[usize]) -> Self {
        Self {
            inner,
            fail_flushes: fail_flushes.iter().copied().collect(),
            flushes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn load(&self) -> batch_checkpoint::Result<Option<StoredSnapshot>> {
        self.inner.load().await
    }

    async fn flush(
        &self,
        state: &CheckpointState,
        context: &FlushContext,
    ) -> batch_checkpoint::Result<()> {
        let n = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_flushes.contains(&n) {
            let path = self.inner.layout().results_path();
            let source = atomic_write_with(&path, |file| {
                file.write_all(b"report_id,summary,processing_tim")?;
                Err(io::Error::other("disk full"))
            })
            .unwrap_err();
            return Err(CheckpointError::Flush {
                path,
                operation: "result table",
                source,
            });
        }
        self.inner.flush(state, context).await
    }

    fn location(&self) -> PathBuf {
        self.inner.location()
    }

    fn backup_dir(&self) -> PathBuf {
        self.inner.backup_dir()
    }
}

/// Wraps a [`FileStore`] and makes every flush take at least `delay`.
pub struct SlowStore {
    pub inner: FileStore,
    pub delay: Duration,
}

impl SlowStore {
    pub fn new(inner: FileStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl CheckpointStore for SlowStore {
    async fn load(&self) -> batch_checkpoint::Result<Option<StoredSnapshot>> {
        self.inner.load().await
    }

    async fn flush(
        &self,
        state: &CheckpointState,
        context: &FlushContext,
    ) -> batch_checkpoint::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.flush(state, context).await
    }

    fn location(&self) -> PathBuf {
        self.inner.location()
    }

    fn backup_dir(&self) -> PathBuf {
        self.inner.backup_dir()
    }
}

pub fn read(path: impl AsRef<std::path::Path>) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

pub fn backup_count(store: &FileStore) -> usize {
    std::fs::read_dir(store.layout().backup_dir())
        .map(|entries| entries.count())
        .unwrap_or(0)
}
