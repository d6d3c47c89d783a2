//! Usage enrichment: activity scores from Metabase card statistics.
//!
//! Output rows keep the catalog's own columns and append the usage columns;
//! a usage column replaces a catalog column of the same name. The store
//! drops the key and timestamp columns from the carried cells.

use crate::catalog::CardRef;
use async_trait::async_trait;
use batch_checkpoint::{FailureKind, Fields, ItemFailure, ItemProcessor, WorkItem};
use chrono::{DateTime, Utc};
use metabase_client::{CardLookup, MetabaseError};

pub struct EnrichProcessor<L> {
    lookup: L,
    reference_time: Option<DateTime<Utc>>,
}

impl<L: CardLookup> EnrichProcessor<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            reference_time: None,
        }
    }


    /// Score recency against a fixed instant instead of the wall clock.
    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = Some(at);
        self
    }
}

#[async_trait]
impl<L: CardLookup> ItemProcessor<CardRef> for EnrichProcessor<L> {
    async fn process(&self, item: &WorkItem<CardRef>) -> Result<Fields, ItemFailure> {
        let card = self
            .lookup
            .get_card(item.key.get())
            .await
            .map_err(|e| with_name(failure_from_metabase(e), &item.payload))?
            .ok_or_else(|| {
                with_name(
                    ItemFailure::new(
                        FailureKind::NotFound,
                        format!("Card {} not found", item.key),
                    ),
                    &item.payload,
                )
            })?;

        let activity = card.activity_at(self.reference_time.unwrap_or_else(Utc::now));

        let mut fields = catalog_fields(&item.payload);
        if fields.get("report_name").map_or(true, str::is_empty) {
            fields.insert("report_name", card.name.as_str());
        }

        Ok(fields
            .with("activity_score", activity.score.to_string())
            .with("is_recently_used", activity.recently_used.to_string())
            .with("last_query_start", card.last_query_start.unwrap_or_default())
            .with("dashboard_count", card.dashboard_count.to_string())
            .with("parameter_usage_count", card.parameter_usage_count.to_string())
            .with("updated_at", card.updated_at.unwrap_or_default()))
    }
}

/// Catalog cells carried into the output row.
pub fn catalog_fields(payload: &CardRef) -> Fields {
    let mut fields = Fields::new();
    for (column, cell) in &payload.columns {
        fields.insert(column.as_str(), cell.as_str());
    }
    fields
}

/// Map a lookup error onto the failure taxonomy.
pub fn failure_from_metabase(err: MetabaseError) -> ItemFailure {
    let kind = match &err {
        MetabaseError::Timeout(_) => FailureKind::Timeout,
        MetabaseError::HttpError(e) if e.is_timeout() => FailureKind::Timeout,
        _ => FailureKind::ServiceError,
    };
    ItemFailure::new(kind, err.to_string())
}

pub(crate) fn with_name(failure: ItemFailure, payload: &CardRef) -> ItemFailure {
    match &payload.report_name {
        Some(name) => failure.with_context(name.as_str()),
        None => failure,
    }
}
