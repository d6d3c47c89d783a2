//! Status and gap reporting through the CLI handlers

mod common;

use batch_checkpoint::{NoopProgress, ShutdownCoordinator, WorkKey};
use common::*;
use reportctx::catalog::ReportPayload;
use reportctx::cli::{handle_gaps, handle_status};
use reportctx::jobs::{JobKind, SummarizeProcessor};
use reportctx::RunOverrides;
use std::sync::Arc;
use tempfile::TempDir;

const REPORTS: &str = "report_name,sql_query\nA,SELECT 1\nB,SELECT 2\nC,\nD,SELECT 4\n";

#[tokio::test]
async fn test_gaps_before_and_after_a_run() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", REPORTS);
    let config = config(&dir, &catalog);

    let gaps = handle_gaps(&config, JobKind::Summarize, &RunOverrides::default())
        .await
        .unwrap();
    assert_eq!(gaps.total, 4);
    assert_eq!(gaps.missing_ranges(), "1-4");

    let plan = plan(JobKind::Summarize, &config);
    let summarizer = FakeSummarizer::default();
    let processor = SummarizeProcessor::new(&summarizer, 2000);
    let prepared = plan.prepare::<ReportPayload>().await.unwrap();
    plan.execute(prepared, &processor, ShutdownCoordinator::new(), Arc::new(NoopProgress))
        .await
        .unwrap();

    let status = handle_status(&config, JobKind::Summarize, &RunOverrides::default())
        .await
        .unwrap();
    assert_eq!(status.completed, 3);
    assert_eq!(status.missing, vec![WorkKey::new(3)]);
}

#[tokio::test]
async fn test_catalog_override_and_missing_catalog() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", REPORTS);
    let config = config(&dir, &dir.path().join("absent.csv"));

    let err = handle_gaps(&config, JobKind::Summarize, &RunOverrides::default())
        .await
        .unwrap_err();
    assert!(err.is_startup_error());

    let overrides = RunOverrides {
        catalog: Some(catalog),
        ..RunOverrides::default()
    };
    let gaps = handle_gaps(&config, JobKind::Summarize, &overrides).await.unwrap();
    assert_eq!(gaps.total, 4);
}

#[tokio::test]
async fn test_missing_required_column_is_reported() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", "report_name\nA\n");
    let config = config(&dir, &catalog);

    let err = handle_status(&config, JobKind::Summarize, &RunOverrides::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sql_query"));
}
