//! Durable checkpoint storage.
//!
//! [`CheckpointStore`] is the seam between the executor and whatever holds the
//! committed state. [`FileStore`] is the on-disk implementation: a set of CSV
//! tables plus a JSON state hint, all replaced with [`atomic_write`].
//!
//! # Files
//!
//! For a layout with stem `business_context` in directory `out/`:
//!
//! | file | contents |
//! |---|---|
//! | `out/business_context.results.csv` | canonical result table, one row per key, ascending |
//! | `out/business_context.failures.csv` | failed attempts, superseded by later results |
//! | `out/business_context.summary.csv` | `Metric,Value` run summary |
//! | `out/business_context.state.json` | lightweight hint: counter and key lists |
//!
//! A flush first writes and syncs all three tables to temp files. Nothing is
//! renamed until every table is staged, so a failed write leaves the whole
//! store at the previous checkpoint. The results table is then renamed into
//! place; that rename is the commit point. The failures and summary tables
//! follow, then the state hint. A crash between those renames can leave a
//! failures table one checkpoint behind; loading drops failures for keys that
//! have a result, so the stale rows never outweigh the committed results.

use crate::atomic::{atomic_write, StagedFile};
use crate::error::{CheckpointError, Result};
use crate::item::{KeyScheme, WorkKey};
use crate::record::{CheckpointState, FailureKind, FailureRecord, Fields, ResultRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column holding the result timestamp in the results table.
pub const TIMESTAMP_COLUMN: &str = "processing_timestamp";

const FAILURE_COLUMNS: [&str; 4] = ["failure_kind", "error_detail", "context", "failed_at"];

/// Run-level numbers written alongside a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushContext {
    /// Checkpoint number this flush commits.
    pub checkpoint: u64,
    pub saved_at: DateTime<Utc>,
    pub catalog_total: usize,
    /// Catalog keys with a result in the state being flushed.
    pub catalog_completed: usize,
    pub checkpoint_every: usize,
}

/// Lightweight JSON sidecar. Advisory only: the results table wins on
/// disagreement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateHint {
    pub completed_keys: Vec<WorkKey>,
    pub failed_keys: Vec<WorkKey>,
    pub last_save: Option<DateTime<Utc>>,
    pub total_processed: usize,
    pub checkpoint: u64,
}

impl StateHint {
    fn from_state(state: &CheckpointState, context: &FlushContext) -> Self {
        Self {
            completed_keys: state.results().map(|r| r.key).collect(),
            failed_keys: state.failures().map(|f| f.key).collect(),
            last_save: Some(context.saved_at),
            total_processed: state.result_count(),
            checkpoint: context.checkpoint,
        }
    }
}

/// Raw contents of a store as read from durable storage.
///
/// Results are returned as found, duplicates included; the ledger decides
/// how to reconcile them.
#[derive(Debug, Clone, Default)]
pub struct StoredSnapshot {
    pub results: Vec<ResultRecord>,
    pub failures: Vec<FailureRecord>,
    pub hint: Option<StateHint>,
}

/// Durable holder of committed checkpoint state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read committed state. `Ok(None)` means nothing was ever committed.
    ///
    /// A store that exists but cannot be parsed is
    /// [`CheckpointError::LedgerCorrupt`], never an empty snapshot.
    async fn load(&self) -> Result<Option<StoredSnapshot>>;

    /// Replace the committed state with `state`. On error the previously
    /// committed state must still be readable.
    async fn flush(&self, state: &CheckpointState, context: &FlushContext) -> Result<()>;

    /// Human-readable location of the canonical results, for reports.
    fn location(&self) -> PathBuf;

    /// Directory for emergency backups.
    fn backup_dir(&self) -> PathBuf;
}

/// Where a [`FileStore`] keeps its files and how keys are rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub dir: PathBuf,
    pub stem: String,
    pub key_column: String,
    pub key_scheme: KeyScheme,
}

impl StoreLayout {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            key_column: "key".to_string(),
            key_scheme: KeyScheme::Numeric,
        }
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    pub fn with_key_scheme(mut self, scheme: KeyScheme) -> Self {
        self.key_scheme = scheme;
        self
    }

    pub fn results_path(&self) -> PathBuf {
        self.file("results.csv")
    }

    pub fn failures_path(&self) -> PathBuf {
        self.file("failures.csv")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.file("summary.csv")
    }

    pub fn state_path(&self) -> PathBuf {
        self.file("state.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join("emergency_backups")
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, suffix))
    }
}

/// CSV-table checkpoint store.
#[derive(Debug, Clone)]
pub struct FileStore {
    layout: StoreLayout,
}

impl FileStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn render_results(&self, state: &CheckpointState) -> Result<Vec<u8>> {
        let reserved = [self.layout.key_column.as_str(), TIMESTAMP_COLUMN];
        let mut columns: Vec<&str> = Vec::new();
        for record in state.results() {
            for column in record.fields.columns() {
                // The store writes these itself.
                if !reserved.contains(&column) && !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = Vec::with_capacity(columns.len() + 2);
        header.push(self.layout.key_column.as_str());
        header.extend(columns.iter().copied());
        header.push(TIMESTAMP_COLUMN);
        writer.write_record(&header)?;

        for record in state.results() {
            let mut row = Vec::with_capacity(header.len());
            row.push(self.layout.key_scheme.render(record.key));
            for column in &columns {
                row.push(record.fields.get(column).unwrap_or_default().to_string());
            }
            row.push(format_timestamp(record.processed_at));
            writer.write_record(&row)?;
        }

        finish(writer)
    }

    fn render_failures(&self, state: &CheckpointState) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![self.layout.key_column.as_str()];
        header.extend(FAILURE_COLUMNS);
        writer.write_record(&header)?;

        for failure in state.failures() {
            writer.write_record([
                self.layout.key_scheme.render(failure.key),
                failure.kind.to_string(),
                failure.detail.clone(),
                failure.context.clone().unwrap_or_default(),
                format_timestamp(failure.failed_at),
            ])?;
        }

        finish(writer)
    }

    fn render_summary(state: &CheckpointState, context: &FlushContext) -> Result<Vec<u8>> {
        let processed = context.catalog_completed;
        let pct = if context.catalog_total == 0 {
            100.0
        } else {
            (processed as f64 / context.catalog_total as f64 * 100.0).min(100.0)
        };

        let rows = [
            ("Catalog Size", context.catalog_total.to_string()),
            ("Processed", processed.to_string()),
            ("Failed", state.failure_count().to_string()),
            ("Completion %", format!("{:.1}", pct)),
            ("Last Updated", format_timestamp(context.saved_at)),
            ("Checkpoint", context.checkpoint.to_string()),
            ("Checkpoint Frequency", context.checkpoint_every.to_string()),
        ];

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["Metric", "Value"])?;
        for (metric, value) in rows {
            writer.write_record([metric, value.as_str()])?;
        }
        finish(writer)
    }

    fn parse_results(&self, path: &Path, bytes: &[u8]) -> Result<Vec<ResultRecord>> {
        if bytes.is_empty() {
            return Err(CheckpointError::corrupt(path, "file is empty"));
        }

        let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|e| CheckpointError::corrupt(path, format!("unreadable header: {}", e)))?
            .clone();

        let key_index = headers
            .iter()
            .position(|h| h == self.layout.key_column)
            .ok_or_else(|| {
                CheckpointError::corrupt(
                    path,
                    format!("missing key column '{}'", self.layout.key_column),
                )
            })?;
        let ts_index = headers
            .iter()
            .position(|h| h == TIMESTAMP_COLUMN)
            .ok_or_else(|| {
                CheckpointError::corrupt(path, format!("missing column '{}'", TIMESTAMP_COLUMN))
            })?;

        let mut results = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let line = row + 2;
            let record =
                record.map_err(|e| CheckpointError::corrupt(path, format!("line {}: {}", line, e)))?;

            let key = self
                .layout
                .key_scheme
                .parse(record.get(key_index).unwrap_or_default())
                .map_err(|e| CheckpointError::corrupt(path, format!("line {}: {}", line, e)))?;

            let processed_at = parse_timestamp(record.get(ts_index).unwrap_or_default())
                .map_err(|e| CheckpointError::corrupt(path, format!("line {}: {}", line, e)))?;

            let fields: Fields = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(i, _)| *i != key_index && *i != ts_index)
                .map(|(_, (column, value))| (column, value))
                .collect();

            results.push(ResultRecord {
                key,
                fields,
                processed_at,
            });
        }

        Ok(results)
    }

    fn parse_failures(&self, bytes: &[u8]) -> std::result::Result<Vec<FailureRecord>, String> {
        let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
        let headers = reader.headers().map_err(|e| e.to_string())?.clone();

        let index = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| format!("missing column '{}'", name))
        };
        let key_i = index(self.layout.key_column.as_str())?;
        let kind_i = index(FAILURE_COLUMNS[0])?;
        let detail_i = index(FAILURE_COLUMNS[1])?;
        let context_i = index(FAILURE_COLUMNS[2])?;
        let at_i = index(FAILURE_COLUMNS[3])?;

        let mut failures = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| e.to_string())?;
            let field = |i: usize| record.get(i).unwrap_or_default();

            let key = self
                .layout
                .key_scheme
                .parse(field(key_i))
                .map_err(|e| e.to_string())?;
            let kind = FailureKind::parse(field(kind_i))
                .ok_or_else(|| format!("unknown failure kind '{}'", field(kind_i)))?;
            let context = Some(field(context_i))
                .filter(|c| !c.is_empty())
                .map(str::to_string);

            failures.push(FailureRecord {
                key,
                kind,
                detail: field(detail_i).to_string(),
                context,
                failed_at: parse_timestamp(field(at_i))?,
            });
        }

        Ok(failures)
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::corrupt(path, e.to_string())),
        }
    }

    /// Write every table to a synced temp file without touching the store.
    async fn stage(&self, state: &CheckpointState, context: &FlushContext) -> Result<StagedTables> {
        let results = self.render_results(state)?;
        let failures = self.render_failures(state)?;
        let summary = Self::render_summary(state, context)?;
        let layout = self.layout.clone();

        blocking(move || {
            Ok(StagedTables {
                results: stage_table(layout.results_path(), &results, "result table")?,
                failures: stage_table(layout.failures_path(), &failures, "failure table")?,
                summary: stage_table(layout.summary_path(), &summary, "summary table")?,
            })
        })
        .await
    }

    /// Rename staged tables into place, results first.
    async fn commit(&self, tables: StagedTables) -> Result<()> {
        blocking(move || {
            let StagedTables {
                results,
                failures,
                summary,
            } = tables;

            let path = results.target().to_path_buf();
            results.commit().map_err(|source| CheckpointError::Flush {
                path,
                operation: "result table",
                source,
            })?;

            for (table, operation) in [(failures, "failure table"), (summary, "summary table")] {
                let path = table.target().to_path_buf();
                if let Err(e) = table.commit() {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Results committed but the {} was not replaced", operation
                    );
                }
            }
            Ok(())
        })
        .await
    }

    async fn write(path: PathBuf, bytes: Vec<u8>, operation: &'static str) -> Result<()> {
        atomic_write(&path, bytes)
            .await
            .map_err(|source| CheckpointError::Flush {
                path,
                operation,
                source,
            })
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn load(&self) -> Result<Option<StoredSnapshot>> {
        let results_path = self.layout.results_path();
        let Some(bytes) = Self::read_optional(&results_path).await? else {
            debug!(path = %results_path.display(), "No result store found");
            return Ok(None);
        };
        let results = self.parse_results(&results_path, &bytes)?;

        let failures_path = self.layout.failures_path();
        let failures = match tokio::fs::read(&failures_path).await {
            Ok(bytes) => match self.parse_failures(&bytes) {
                Ok(failures) => failures,
                Err(reason) => {
                    warn!(
                        path = %failures_path.display(),
                        reason = %reason,
                        "Ignoring unreadable failure table"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %failures_path.display(), error = %e, "Ignoring unreadable failure table");
                Vec::new()
            }
        };

        let state_path = self.layout.state_path();
        let hint = match tokio::fs::read(&state_path).await {
            Ok(bytes) => match serde_json::from_slice::<StateHint>(&bytes) {
                Ok(hint) => Some(hint),
                Err(e) => {
                    warn!(path = %state_path.display(), error = %e, "Ignoring unreadable state hint");
                    None
                }
            },
            Err(_) => None,
        };

        Ok(Some(StoredSnapshot {
            results,
            failures,
            hint,
        }))
    }

    async fn flush(&self, state: &CheckpointState, context: &FlushContext) -> Result<()> {
        tokio::fs::create_dir_all(&self.layout.dir)
            .await
            .map_err(|source| CheckpointError::Flush {
                path: self.layout.dir.clone(),
                operation: "create directory",
                source,
            })?;

        let tables = self.stage(state, context).await?;
        self.commit(tables).await?;

        let hint = serde_json::to_vec_pretty(&StateHint::from_state(state, context))?;
        if let Err(e) = Self::write(self.layout.state_path(), hint, "state hint").await {
            warn!(error = %e, "Results committed but state hint was not updated");
        }

        debug!(
            checkpoint = context.checkpoint,
            results = state.result_count(),
            failures = state.failure_count(),
            "Checkpoint flushed"
        );
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.layout.results_path()
    }

    fn backup_dir(&self) -> PathBuf {
        self.layout.backup_dir()
    }
}

/// The three tables of one flush, written but not yet visible.
#[derive(Debug)]
struct StagedTables {
    results: StagedFile,
    failures: StagedFile,
    summary: StagedFile,
}

fn stage_table(path: PathBuf, bytes: &[u8], operation: &'static str) -> Result<StagedFile> {
    StagedFile::stage(&path, bytes).map_err(|source| CheckpointError::Flush {
        path,
        operation,
        source,
    })
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CheckpointError::Io(io::Error::other(e)))?
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| CheckpointError::Io(e.into_error()))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", value, e))
}
