//! Batch jobs over report catalogs.
//!
//! Every job runs on the same checkpointed executor and differs only in its
//! catalog schema, its processor and the store it writes to. A [`JobPlan`]
//! resolves those from configuration; [`JobPlan::prepare`] reconstructs the
//! ledger and gap analysis; [`JobPlan::execute`] processes what is missing.

pub mod enrich;
pub mod fetch;
pub mod summarize;

pub use enrich::EnrichProcessor;
pub use fetch::FetchProcessor;
pub use summarize::SummarizeProcessor;

use crate::config::ReportctxConfig;
use crate::error::{ReportctxError, Result};
use batch_checkpoint::{
    CheckpointState, CheckpointedExecutor, CompletionLedger, CsvCatalog, ExecutorConfig,
    FileStore, GapReport, ItemProcessor, KeyScheme, KeySource, ProgressObserver, RunReport,
    ShutdownCoordinator, StoreLayout, WorkCatalog, WorkItem, WorkKey,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Positional report keys are rendered as `Report_<row>`.
pub const REPORT_KEY_PREFIX: &str = "Report_";

/// The batch jobs reportctx can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum JobKind {
    /// Generate business context for each report with the LLM
    Summarize,
    /// Add Metabase usage and activity scores to each report
    Enrich,
    /// Fetch card metadata and SQL from Metabase
    Fetch,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Enrich => "enrich",
            Self::Fetch => "fetch",
        }
    }

    /// Catalog id column when the config does not name one.
    /// `None` keys rows by position.
    pub fn default_key_column(&self) -> Option<&'static str> {
        match self {
            Self::Summarize => None,
            Self::Enrich => Some("metabase_report_id"),
            Self::Fetch => Some("report_id"),
        }
    }

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Summarize => &["report_name", "sql_query"],
            Self::Enrich | Self::Fetch => &[],
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CLI flags layered over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub catalog: Option<PathBuf>,
    pub limit: Option<usize>,
    pub workers: Option<usize>,
    pub checkpoint_every: Option<usize>,
}

/// Everything needed to run one job against one catalog and store.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub kind: JobKind,
    pub catalog_path: PathBuf,
    pub key_source: KeySource,
    pub layout: StoreLayout,
    pub executor: ExecutorConfig,
}

/// Catalog and ledger loaded for a run, before any processing.
#[derive(Debug)]
pub struct Prepared<P> {
    pub items: Vec<WorkItem<P>>,
    pub ledger: CompletionLedger,
    pub state: CheckpointState,
    pub gaps: GapReport,
}

impl JobPlan {
    pub fn from_config(
        kind: JobKind,
        config: &ReportctxConfig,
        overrides: &RunOverrides,
    ) -> Result<Self> {
        let catalog_path = overrides
            .catalog
            .clone()
            .or_else(|| config.catalog.path.clone())
            .ok_or_else(|| {
                ReportctxError::Config(
                    "No catalog configured; pass --catalog or set [catalog] path".to_string(),
                )
            })?;

        let key_column = config
            .catalog
            .key_column
            .clone()
            .or_else(|| kind.default_key_column().map(str::to_string));

        let (key_source, layout_key, scheme) = match key_column {
            Some(column) => (KeySource::Column(column.clone()), column, KeyScheme::Numeric),
            None => (
                KeySource::Position,
                "report_id".to_string(),
                KeyScheme::prefixed(REPORT_KEY_PREFIX),
            ),
        };

        let layout = StoreLayout::new(
            &config.store.dir,
            format!("{}_{}", config.store.prefix, kind.name()),
        )
        .with_key_column(layout_key)
        .with_key_scheme(scheme);

        let mut executor = config.execution.executor_config();
        if let Some(limit) = overrides.limit {
            executor.batch_limit = Some(limit);
        }
        if let Some(workers) = overrides.workers {
            executor.workers = workers;
        }
        if let Some(every) = overrides.checkpoint_every {
            executor.checkpoint_every = every;
        }
        executor
            .validate()
            .map_err(|e| ReportctxError::Config(e.to_string()))?;

        Ok(Self {
            kind,
            catalog_path,
            key_source,
            layout,
            executor,
        })
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(self.layout.clone())
    }

    /// Enumerate the catalog and rebuild the completion ledger.
    pub async fn prepare<P: DeserializeOwned>(&self) -> Result<Prepared<P>> {
        let catalog = CsvCatalog::<P>::new(&self.catalog_path, self.key_source.clone())
            .with_required_columns(self.kind.required_columns().iter().copied());
        let items = catalog.enumerate()?;

        let (ledger, state) = CompletionLedger::load(&self.store()).await?;
        let gaps = ledger.gap_report(items.iter().map(|item| item.key));

        let orphaned = ledger.len().saturating_sub(gaps.completed);
        if orphaned > 0 {
            warn!(
                job = %self.kind,
                orphaned = orphaned,
                "Result store holds keys that are not in the catalog"
            );
        }

        info!(
            job = %self.kind,
            total = gaps.total,
            completed = gaps.completed,
            missing = gaps.missing.len(),
            "Gap analysis complete"
        );

        Ok(Prepared {
            items,
            ledger,
            state,
            gaps,
        })
    }

    /// Process every catalog item missing from the ledger.
    pub async fn execute<P, Proc>(
        &self,
        prepared: Prepared<P>,
        processor: &Proc,
        shutdown: ShutdownCoordinator,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<RunReport>
    where
        P: Send + Sync,
        Proc: ItemProcessor<P> + ?Sized,
    {
        let Prepared {
            items,
            ledger,
            mut state,
            ..
        } = prepared;

        let catalog: Vec<WorkKey> = items.iter().map(|item| item.key).collect();
        let queue: Vec<WorkItem<P>> = items
            .into_iter()
            .filter(|item| !ledger.is_completed(item.key))
            .collect();

        let executor = CheckpointedExecutor::new(self.executor.clone(), self.store(), shutdown)?
            .with_observer(observer);

        let report = executor.run(queue, &mut state, processor, catalog).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_catalog() -> ReportctxConfig {
        let mut config = ReportctxConfig::default();
        config.catalog.path = Some(PathBuf::from("reports.csv"));
        config
    }

    #[test]
    fn test_summarize_keys_by_position_with_prefix() {
        let plan =
            JobPlan::from_config(JobKind::Summarize, &config_with_catalog(), &RunOverrides::default())
                .unwrap();

        assert_eq!(plan.key_source, KeySource::Position);
        assert_eq!(plan.layout.key_column, "report_id");
        assert_eq!(plan.layout.key_scheme, KeyScheme::prefixed("Report_"));
        assert_eq!(plan.layout.stem, "reportctx_summarize");
    }

    #[test]
    fn test_enrich_keys_by_card_id() {
        let plan =
            JobPlan::from_config(JobKind::Enrich, &config_with_catalog(), &RunOverrides::default())
                .unwrap();

        assert_eq!(plan.key_source, KeySource::Column("metabase_report_id".into()));
        assert_eq!(plan.layout.key_scheme, KeyScheme::Numeric);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = RunOverrides {
            catalog: Some(PathBuf::from("other.csv")),
            limit: Some(25),
            workers: Some(3),
            checkpoint_every: Some(10),
        };
        let plan = JobPlan::from_config(JobKind::Fetch, &config_with_catalog(), &overrides).unwrap();

        assert_eq!(plan.catalog_path, PathBuf::from("other.csv"));
        assert_eq!(plan.executor.batch_limit, Some(25));
        assert_eq!(plan.executor.workers, 3);
        assert_eq!(plan.executor.checkpoint_every, 10);
    }

    #[test]
    fn test_missing_catalog_is_config_error() {
        let result = JobPlan::from_config(
            JobKind::Summarize,
            &ReportctxConfig::default(),
            &RunOverrides::default(),
        );
        assert!(matches!(result, Err(ReportctxError::Config(_))));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let overrides = RunOverrides {
            workers: Some(0),
            ..RunOverrides::default()
        };
        assert!(JobPlan::from_config(JobKind::Fetch, &config_with_catalog(), &overrides).is_err());
    }
}
