//! Map positional result keys back to Metabase card ids.
//!
//! A catalog keyed by position stores `Report_<row>` keys. The card id of
//! each result is read from the same catalog row, and the mapped table
//! carries it as the first column.

use crate::catalog::CardRef;
use crate::error::{ReportctxError, Result};
use crate::jobs::JobPlan;
use batch_checkpoint::store::TIMESTAMP_COLUMN;
use batch_checkpoint::{
    atomic_write, CheckpointState, CompletionLedger, CsvCatalog, KeyScheme, KeySource,
    WorkCatalog, WorkKey,
};
use chrono::SecondsFormat;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Column added in front of every mapped row.
pub const MAPPED_ID_COLUMN: &str = "metabase_report_id";

#[derive(Debug, Clone, PartialEq)]
pub struct MappingReport {
    pub rows: usize,
    pub mapped: usize,
    pub output: PathBuf,
}

impl MappingReport {
    pub fn mapped_pct(&self) -> f64 {
        if self.rows == 0 {
            100.0
        } else {
            self.mapped as f64 / self.rows as f64 * 100.0
        }
    }
}

/// Map every stored result of `plan` and write the mapped table to `output`.
///
/// Rows whose catalog row is gone or has no id keep an empty id cell.
pub async fn map_results(plan: &JobPlan, id_column: &str, output: &Path) -> Result<MappingReport> {
    if plan.key_source != KeySource::Position {
        return Err(ReportctxError::Config(format!(
            "{} results are keyed by catalog column '{}'; there is nothing to map",
            plan.kind, plan.layout.key_column
        )));
    }

    let ids = catalog_ids(&plan.catalog_path, id_column)?;
    let (_, state) = CompletionLedger::load(&plan.store()).await?;

    let (bytes, mapped) = render_mapped(&state, &ids, &plan.layout.key_column, &plan.layout.key_scheme)
        .map_err(io::Error::from)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    atomic_write(output, bytes).await?;

    let report = MappingReport {
        rows: state.result_count(),
        mapped,
        output: output.to_path_buf(),
    };
    if report.mapped < report.rows {
        warn!(unmapped = report.rows - report.mapped, "Some results have no card id");
    }
    info!(
        rows = report.rows,
        mapped = report.mapped,
        path = %output.display(),
        "Mapped results written"
    );
    Ok(report)
}

/// Card id by row position; blank ids are left out.
pub fn catalog_ids(catalog: &Path, id_column: &str) -> Result<BTreeMap<WorkKey, String>> {
    let rows = CsvCatalog::<CardRef>::new(catalog, KeySource::Position)
        .with_required_columns([id_column])
        .enumerate()?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.payload.column(id_column).filter(|id| !id.is_empty())?;
            Some((row.key, id.to_string()))
        })
        .collect())
}

/// The mapped table and the number of rows that found an id.
pub fn render_mapped(
    state: &CheckpointState,
    ids: &BTreeMap<WorkKey, String>,
    key_column: &str,
    scheme: &KeyScheme,
) -> std::result::Result<(Vec<u8>, usize), csv::Error> {
    let reserved = [MAPPED_ID_COLUMN, key_column, TIMESTAMP_COLUMN];
    let mut columns: Vec<&str> = Vec::new();
    for record in state.results() {
        for column in record.fields.columns() {
            if !reserved.contains(&column) && !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![MAPPED_ID_COLUMN, key_column];
    header.extend(columns.iter().copied());
    header.push(TIMESTAMP_COLUMN);
    writer.write_record(&header)?;

    let mut mapped = 0;
    for record in state.results() {
        let id = ids.get(&record.key);
        if id.is_some() {
            mapped += 1;
        }

        let mut row = Vec::with_capacity(header.len());
        row.push(id.cloned().unwrap_or_default());
        row.push(scheme.render(record.key));
        for column in &columns {
            row.push(record.fields.get(column).unwrap_or_default().to_string());
        }
        row.push(record.processed_at.to_rfc3339_opts(SecondsFormat::Micros, true));
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok((bytes, mapped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_checkpoint::{Fields, ResultRecord};
    use std::io::Write;

    fn state() -> CheckpointState {
        let mut state = CheckpointState::new();
        for (key, question) in [(1, "What did we sell?"), (3, "Who left?"), (9, "Orphan")] {
            state.record_success(ResultRecord::new(
                WorkKey::new(key),
                Fields::new().with("business_question", question),
            ));
        }
        state
    }

    #[test]
    fn test_render_puts_card_id_first() {
        let ids = BTreeMap::from([
            (WorkKey::new(1), "101".to_string()),
            (WorkKey::new(3), "303".to_string()),
        ]);
        let (bytes, mapped) =
            render_mapped(&state(), &ids, "report_id", &KeyScheme::prefixed("Report_")).unwrap();
        assert_eq!(mapped, 2);

        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "metabase_report_id,report_id,business_question,processing_timestamp"
        );
        assert!(lines[1].starts_with("101,Report_1,What did we sell?,"));
        assert!(lines[2].starts_with("303,Report_3,Who left?,"));
        assert!(lines[3].starts_with(",Report_9,Orphan,"));
    }

    #[test]
    fn test_catalog_ids_skip_blank_cells() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"report_id,report_name\n101,Revenue\n,Draft\n303,Churn\n")
            .unwrap();

        let ids = catalog_ids(file.path(), "report_id").unwrap();
        assert_eq!(ids.get(&WorkKey::new(1)).map(String::as_str), Some("101"));
        assert_eq!(ids.get(&WorkKey::new(2)), None);
        assert_eq!(ids.get(&WorkKey::new(3)).map(String::as_str), Some("303"));
        assert!(catalog_ids(file.path(), "card_id").is_err());
    }

    #[test]
    fn test_mapped_pct() {
        let report = MappingReport {
            rows: 4,
            mapped: 3,
            output: PathBuf::from("out.csv"),
        };
        assert_eq!(report.mapped_pct(), 75.0);
    }
}
