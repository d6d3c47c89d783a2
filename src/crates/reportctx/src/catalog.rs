//! Catalog row schemas for report spreadsheets exported to CSV.
//!
//! Spreadsheet exports mark missing cells in several ways (empty, `nan`,
//! `None`, `null`); every optional column normalizes them to `None`.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Row of a report catalog used for business-context generation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportPayload {
    #[serde(default, deserialize_with = "optional_cell")]
    pub report_name: Option<String>,

    #[serde(default, deserialize_with = "optional_cell")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "optional_cell")]
    pub sql_query: Option<String>,
}

/// Row of a catalog keyed by Metabase card id.
///
/// The id itself is the work key; the name is only used as context in
/// failure records. Every cell is also kept in header order so jobs can
/// carry the catalog's own columns into their output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardRef {
    pub report_name: Option<String>,

    /// `(column, cell)` pairs; null markers are blanked.
    pub columns: Vec<(String, String)>,
}

impl CardRef {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            columns: vec![("report_name".to_string(), name.clone())],
            report_name: Some(name),
        }
    }

    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, cell)| cell.as_str())
    }
}

impl<'de> Deserialize<'de> for CardRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = CardRef;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a catalog row with a header")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<CardRef, A::Error> {
                let mut row = CardRef::default();
                while let Some((column, cell)) = map.next_entry::<String, String>()? {
                    let cell = normalize_cell(cell);
                    if column == "report_name" {
                        row.report_name = cell.clone();
                    }
                    row.columns.push((column, cell.unwrap_or_default()));
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Deserialize a cell, treating blank and null-like markers as absent.
pub fn optional_cell<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(normalize_cell))
}

fn normalize_cell(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || ["nan", "none", "null", "n/a"]
            .iter()
            .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_checkpoint::{CsvCatalog, KeySource, WorkCatalog};
    use std::io::Write;

    fn catalog_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_null_markers_become_none() {
        assert_eq!(normalize_cell("nan".into()), None);
        assert_eq!(normalize_cell(" NaN ".into()), None);
        assert_eq!(normalize_cell("None".into()), None);
        assert_eq!(normalize_cell("   ".into()), None);
        assert_eq!(normalize_cell(" Revenue ".into()), Some("Revenue".into()));
    }

    #[test]
    fn test_report_payload_from_csv() {
        let file = catalog_file(
            "report_name,description,sql_query\n\
             Revenue,nan,SELECT 1\n\
             ,Orphan,SELECT 2\n",
        );
        let items = CsvCatalog::<ReportPayload>::new(file.path(), KeySource::Position)
            .enumerate()
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload.report_name.as_deref(), Some("Revenue"));
        assert_eq!(items[0].payload.description, None);
        assert_eq!(items[1].payload.report_name, None);
        assert_eq!(items[1].payload.sql_query.as_deref(), Some("SELECT 2"));
    }

    #[test]
    fn test_missing_optional_columns_default() {
        let file = catalog_file("metabase_report_id\n42\n");
        let items =
            CsvCatalog::<CardRef>::new(file.path(), KeySource::Column("metabase_report_id".into()))
                .enumerate()
                .unwrap();

        assert_eq!(items[0].key.get(), 42);
        assert_eq!(items[0].payload.report_name, None);
    }

    #[test]
    fn test_card_ref_keeps_every_column_in_order() {
        let file = catalog_file(
            "metabase_report_id,report_name,owner,tier\n\
             42, Revenue ,finance,nan\n",
        );
        let items =
            CsvCatalog::<CardRef>::new(file.path(), KeySource::Column("metabase_report_id".into()))
                .enumerate()
                .unwrap();

        let row = &items[0].payload;
        assert_eq!(row.report_name.as_deref(), Some("Revenue"));
        let columns: Vec<&str> = row.columns.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["metabase_report_id", "report_name", "owner", "tier"]);
        assert_eq!(row.column("owner"), Some("finance"));
        assert_eq!(row.column("tier"), Some(""));
        assert_eq!(row.column("missing"), None);
    }
}
