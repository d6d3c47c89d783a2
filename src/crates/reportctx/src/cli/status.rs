//! `reportctx status <job>` and `reportctx gaps <job>` handlers

use crate::cli::helpers::{print_gap_report, shorten};
use crate::config::ReportctxConfig;
use crate::error::Result;
use crate::jobs::{JobKind, JobPlan, Prepared, RunOverrides};
use batch_checkpoint::{FailureRecord, GapReport, KeyScheme};
use colored::Colorize;
use std::collections::HashMap;
use tabled::{Table, Tabled};

/// Table row for displaying recorded failures
#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Detail")]
    detail: String,
    #[tabled(rename = "Context")]
    context: String,
    #[tabled(rename = "Failed At")]
    failed_at: String,
}

impl FailureRow {
    fn new(record: &FailureRecord, scheme: &KeyScheme) -> Self {
        Self {
            key: scheme.render(record.key),
            kind: record.kind.to_string(),
            detail: shorten(&record.detail, 60),
            context: shorten(record.context.as_deref().unwrap_or("-"), 30),
            failed_at: record.failed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

async fn prepare(
    config: &ReportctxConfig,
    kind: JobKind,
    overrides: &RunOverrides,
) -> Result<(JobPlan, Prepared<HashMap<String, String>>)> {
    let plan = JobPlan::from_config(kind, config, overrides)?;
    let prepared = plan.prepare::<HashMap<String, String>>().await?;
    Ok((plan, prepared))
}

/// Handle status command: gap analysis plus recorded failures
pub async fn handle_status(
    config: &ReportctxConfig,
    kind: JobKind,
    overrides: &RunOverrides,
) -> Result<GapReport> {
    let (plan, prepared) = prepare(config, kind, overrides).await?;
    print_gap_report(&plan, &prepared.gaps);

    if let Some(saved) = prepared.state.last_saved {
        println!(
            "  Last saved:  {} (checkpoint {})",
            saved.format("%Y-%m-%d %H:%M:%S UTC"),
            prepared.state.checkpoint
        );
    }
    if prepared.ledger.duplicates_collapsed() > 0 {
        println!(
            "{}",
            format!(
                "  {} duplicate result rows will be collapsed on the next save",
                prepared.ledger.duplicates_collapsed()
            )
            .yellow()
        );
    }

    let rows: Vec<FailureRow> = prepared
        .state
        .failures()
        .map(|record| FailureRow::new(record, &plan.layout.key_scheme))
        .collect();

    println!();
    if rows.is_empty() {
        println!("{}", "No recorded failures".green());
    } else {
        let count = rows.len();
        println!("{}", Table::new(rows));
        println!("\nTotal: {} failures (retried on the next run)", count);
    }

    Ok(prepared.gaps)
}

/// Handle gaps command: missing ranges only
pub async fn handle_gaps(
    config: &ReportctxConfig,
    kind: JobKind,
    overrides: &RunOverrides,
) -> Result<GapReport> {
    let (_, prepared) = prepare(config, kind, overrides).await?;

    if prepared.gaps.is_complete() {
        println!("{}", "No gaps".green());
    } else {
        println!("{}", prepared.gaps.missing_ranges());
    }
    Ok(prepared.gaps)
}
