//! Catalog discovery: recently used cards that have not been analyzed yet.
//!
//! The card listing is filtered for archived and already-analyzed ids.
//! Usage fields only come with the detailed card, so every remaining card
//! is looked up once and scored before it joins the catalog.

use crate::config::DiscoverConfig;
use crate::error::{ReportctxError, Result};
use batch_checkpoint::{atomic_write, CsvCatalog, KeySource, ShutdownCoordinator, WorkCatalog};
use chrono::{DateTime, Utc};
use metabase_client::{Card, CardListing, CardLookup, CollectionNames, MetabaseError};
use serde::de::IgnoredAny;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

const PROGRESS_EVERY: usize = 100;

/// Filters applied while discovering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverOptions {
    pub min_activity_score: u32,
    /// Card ids that are already analyzed.
    pub exclude: BTreeSet<u64>,
    pub native_only: bool,
    /// Score recency against this instant instead of the wall clock.
    pub reference_time: Option<DateTime<Utc>>,
}

impl DiscoverOptions {
    /// Options from `[discover]`, with the exclusion CSV loaded.
    pub fn from_config(config: &DiscoverConfig) -> Result<Self> {
        let exclude = match &config.exclude {
            Some(path) => load_exclusions(path, &config.exclude_column)?,
            None => BTreeSet::new(),
        };
        Ok(Self {
            min_activity_score: config.min_activity_score,
            exclude,
            native_only: config.native_only,
            reference_time: None,
        })
    }
}

/// One row of a discovered catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredReport {
    pub report_id: u64,
    pub report_name: String,
    pub description: String,
    pub sql_query: String,
    pub collection_id: Option<u64>,
    pub collection_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub activity_score: u32,
    pub last_query_start: String,
    pub dashboard_count: u32,
    pub parameter_usage_count: u32,
}

impl DiscoveredReport {
    pub const COLUMNS: [&'static str; 12] = [
        "report_id",
        "report_name",
        "description",
        "sql_query",
        "collection_id",
        "collection_name",
        "created_at",
        "updated_at",
        "activity_score",
        "last_query_start",
        "dashboard_count",
        "parameter_usage_count",
    ];

    fn new(card: Card, activity_score: u32, collections: &CollectionNames) -> Self {
        Self {
            report_id: card.id,
            sql_query: card.extract_sql(),
            collection_name: collections.name_of(card.collection_id).to_string(),
            report_name: card.name,
            description: card.description.unwrap_or_default(),
            collection_id: card.collection_id,
            created_at: card.created_at.unwrap_or_default(),
            updated_at: card.updated_at.unwrap_or_default(),
            activity_score,
            last_query_start: card.last_query_start.unwrap_or_default(),
            dashboard_count: card.dashboard_count,
            parameter_usage_count: card.parameter_usage_count,
        }
    }
}

/// Where every listed card went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub listed: usize,
    pub archived: usize,
    pub excluded: usize,
    pub inactive: usize,
    pub non_sql: usize,
    pub failed: usize,
    /// Shutdown stopped the detail lookups early.
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub reports: Vec<DiscoveredReport>,
    pub stats: DiscoveryStats,
}

impl Discovery {
    /// The most active reports, highest score first.
    pub fn top(&self, n: usize) -> Vec<&DiscoveredReport> {
        let mut ranked: Vec<&DiscoveredReport> = self.reports.iter().collect();
        ranked.sort_by(|a, b| b.activity_score.cmp(&a.activity_score));
        ranked.truncate(n);
        ranked
    }
}

/// List, filter, look up and score cards.
///
/// Lookup failures are counted and skipped; a rejected key stops discovery.
pub async fn discover<S>(
    source: &S,
    options: &DiscoverOptions,
    shutdown: &ShutdownCoordinator,
) -> Result<Discovery>
where
    S: CardListing + CardLookup + ?Sized,
{
    let now = options.reference_time.unwrap_or_else(Utc::now);
    let cards = source.list_cards().await?;

    let mut stats = DiscoveryStats {
        listed: cards.len(),
        ..DiscoveryStats::default()
    };
    let mut candidates = Vec::new();
    for card in cards {
        if card.archived {
            stats.archived += 1;
        } else if options.exclude.contains(&card.id) {
            stats.excluded += 1;
        } else {
            candidates.push(card.id);
        }
    }

    info!(
        listed = stats.listed,
        archived = stats.archived,
        excluded = stats.excluded,
        candidates = candidates.len(),
        "Card listing filtered"
    );

    if candidates.is_empty() {
        return Ok(Discovery {
            reports: Vec::new(),
            stats,
        });
    }

    let collections = CollectionNames::from_collections(source.list_collections().await?);
    let mut reports = Vec::new();

    for (done, id) in candidates.iter().copied().enumerate() {
        if shutdown.is_shutdown_requested() {
            warn!(looked_up = done, remaining = candidates.len() - done, "Discovery interrupted");
            stats.interrupted = true;
            break;
        }
        if done > 0 && done % PROGRESS_EVERY == 0 {
            info!(looked_up = done, total = candidates.len(), kept = reports.len(), "Discovery progress");
        }

        let card = match source.get_card(id).await {
            Ok(Some(card)) => card,
            Ok(None) => {
                warn!(card_id = id, "Listed card is gone");
                stats.failed += 1;
                continue;
            }
            Err(e @ MetabaseError::AuthenticationError(_)) => return Err(e.into()),
            Err(e) => {
                warn!(card_id = id, error = %e, "Card lookup failed, skipping");
                stats.failed += 1;
                continue;
            }
        };

        let activity = card.activity_at(now);
        if !activity.recently_used || activity.score < options.min_activity_score {
            stats.inactive += 1;
            continue;
        }
        if options.native_only && !card.is_native() {
            debug!(card_id = id, query_type = card.query_kind().unwrap_or("unknown"), "Skipping non-SQL card");
            stats.non_sql += 1;
            continue;
        }

        reports.push(DiscoveredReport::new(card, activity.score, &collections));
    }

    info!(
        kept = reports.len(),
        inactive = stats.inactive,
        non_sql = stats.non_sql,
        failed = stats.failed,
        "Discovery complete"
    );

    Ok(Discovery { reports, stats })
}

/// Ids in `column` of a previously analyzed catalog.
pub fn load_exclusions(path: &Path, column: &str) -> Result<BTreeSet<u64>> {
    let rows = CsvCatalog::<IgnoredAny>::new(path, KeySource::Column(column.to_string()))
        .enumerate()?;
    let exclude: BTreeSet<u64> = rows.into_iter().map(|row| row.key.get()).collect();
    info!(path = %path.display(), ids = exclude.len(), "Exclusion list loaded");
    Ok(exclude)
}

/// Write discovered reports as a catalog CSV, replacing `path` atomically.
///
/// The header is written even when nothing was discovered.
pub async fn write_catalog(path: &Path, reports: &[DiscoveredReport]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(DiscoveredReport::COLUMNS)
        .map_err(io::Error::from)?;
    for report in reports {
        writer.serialize(report).map_err(io::Error::from)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportctxError::Other(format!("Failed to finish catalog CSV: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    atomic_write(path, bytes).await?;
    info!(path = %path.display(), reports = reports.len(), "Discovered catalog written");
    Ok(())
}
