//! Metadata fetch: card name, description and SQL from Metabase.

use super::enrich::{failure_from_metabase, with_name};
use crate::catalog::CardRef;
use async_trait::async_trait;
use batch_checkpoint::{FailureKind, Fields, ItemFailure, ItemProcessor, WorkItem};
use metabase_client::{Card, CardLookup};

pub struct FetchProcessor<L> {
    lookup: L,
}

impl<L: CardLookup> FetchProcessor<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<L: CardLookup> ItemProcessor<CardRef> for FetchProcessor<L> {
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

        Ok(card_fields(&card))
    }
}

/// Columns written for one fetched card.
pub fn card_fields(card: &Card) -> Fields {
    let optional = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_default();
    let query_type = card.query_kind().unwrap_or("unknown");

    Fields::new()
        .with("report_name", card.name.as_str())
        .with(
            "description",
            card.description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or("No description available"),
        )
        .with("sql_query", card.extract_sql())
        .with("query_type", query_type)
        .with("created_at", card.created_at.clone().unwrap_or_default())
        .with("updated_at", card.updated_at.clone().unwrap_or_default())
        .with("collection_id", optional(card.collection_id))
        .with("database_id", optional(card.database_id))
        .with("archived", card.archived.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_card_fields() {
        let card: Card = serde_json::from_value(json!({
            "id": 42,
            "name": "Revenue",
            "description": "",
            "dataset_query": {"type": "native", "native": {"query": "SELECT 1"}},
            "collection_id": 7,
            "created_at": "2023-01-01T00:00:00Z"
        }))
        .unwrap();

        let fields = card_fields(&card);
        assert_eq!(fields.get("report_name"), Some("Revenue"));
        assert_eq!(fields.get("description"), Some("No description available"));
        assert_eq!(fields.get("sql_query"), Some("SELECT 1"));
        assert_eq!(fields.get("query_type"), Some("native"));
        assert_eq!(fields.get("collection_id"), Some("7"));
        assert_eq!(fields.get("database_id"), Some(""));
        assert_eq!(fields.get("archived"), Some("false"));
    }
}
