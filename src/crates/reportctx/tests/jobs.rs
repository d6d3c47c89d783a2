//! End-to-end job runs against fake services

mod common;

use batch_checkpoint::{FailureKind, NoopProgress, ShutdownCoordinator, WorkKey};
use chrono::{TimeZone, Utc};
use common::*;
use reportctx::catalog::{CardRef, ReportPayload};
use reportctx::cli::run::drive;
use reportctx::cli::RunOptions;
use reportctx::jobs::{EnrichProcessor, FetchProcessor, JobKind, SummarizeProcessor};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const REPORTS: &str = "report_name,description,sql_query\n\
Revenue,Monthly revenue,SELECT sum(amount) FROM orders\n\
Churn,nan,SELECT count(*) FROM cancellations\n\
No SQL,Draft,\n\
Blocked Report,,SELECT * FROM secrets\n\
Signups,,SELECT count(*) FROM users\n";

#[tokio::test]
async fn test_summarize_records_results_and_failures() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", REPORTS);
    let config = config(&dir, &catalog);
    let plan = plan(JobKind::Summarize, &config);

    let summarizer = FakeSummarizer::default();
    let processor = SummarizeProcessor::new(&summarizer, 2000);

    let prepared = plan.prepare::<ReportPayload>().await.unwrap();
    assert_eq!(prepared.gaps.missing.len(), 5);

    let report = plan
        .execute(
            prepared,
            &processor,
            ShutdownCoordinator::new(),
            Arc::new(NoopProgress),
        )
        .await
        .unwrap();

    assert!(report.committed);
    assert_eq!(report.newly_completed, 3);
    assert_eq!(report.newly_failed, 2);
    // The row without SQL never reaches the summarizer.
    assert_eq!(summarizer.calls(), 4);

    let state = reload(&plan).await;
    let revenue = state.result(WorkKey::new(1)).unwrap();
    assert_eq!(revenue.fields.get("original_report_name"), Some("Revenue"));
    assert_eq!(revenue.fields.get("business_question"), Some("What did we sell?"));
    assert_eq!(revenue.fields.get("primary_metrics"), Some("Revenue"));
    assert_eq!(revenue.fields.get("raw_response"), Some(SUMMARY));

    let churn = state.result(WorkKey::new(2)).unwrap();
    assert_eq!(churn.fields.get("original_description"), Some(""));

    assert_eq!(
        state.failure(WorkKey::new(3)).unwrap().kind,
        FailureKind::MalformedPayload
    );
    let blocked = state.failure(WorkKey::new(4)).unwrap();
    assert_eq!(blocked.kind, FailureKind::ContentRejected);
    assert_eq!(blocked.context.as_deref(), Some("Blocked Report"));

    let results = std::fs::read_to_string(plan.layout.results_path()).unwrap();
    assert!(results.starts_with("report_id,"));
    assert!(results.contains("\nReport_1,"));
}

#[tokio::test]
async fn test_summarize_resume_only_retries_failures() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", REPORTS);
    let config = config(&dir, &catalog);
    let plan = plan(JobKind::Summarize, &config);

    let first = FakeSummarizer::default();
    let processor = SummarizeProcessor::new(&first, 2000);
    let prepared = plan.prepare::<ReportPayload>().await.unwrap();
    plan.execute(prepared, &processor, ShutdownCoordinator::new(), Arc::new(NoopProgress))
        .await
        .unwrap();

    let second = FakeSummarizer::default();
    let processor = SummarizeProcessor::new(&second, 2000);
    let prepared = plan.prepare::<ReportPayload>().await.unwrap();
    assert_eq!(
        prepared.gaps.missing,
        vec![WorkKey::new(3), WorkKey::new(4)]
    );

    let report = plan
        .execute(prepared, &processor, ShutdownCoordinator::new(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(report.previously_completed, 3);
    assert_eq!(report.newly_completed, 0);
    assert_eq!(second.calls(), 1);
    assert_eq!(reload(&plan).await.result_count(), 3);
}

#[tokio::test]
async fn test_summarize_truncates_long_sql() {
    let dir = TempDir::new().unwrap();
    let long_sql = format!("SELECT {} FROM t", "x, ".repeat(100));
    let catalog = write_catalog(
        &dir,
        "reports.csv",
        &format!("report_name,sql_query\nWide,\"{}\"\n", long_sql),
    );
    let config = config(&dir, &catalog);
    let plan = plan(JobKind::Summarize, &config);

    let summarizer = FakeSummarizer::default();
    let processor = SummarizeProcessor::new(&summarizer, 20);
    let prepared = plan.prepare::<ReportPayload>().await.unwrap();
    plan.execute(prepared, &processor, ShutdownCoordinator::new(), Arc::new(NoopProgress))
        .await
        .unwrap();

    let prompts = summarizer.prompts.lock().unwrap();
    assert!(prompts[0].contains(&format!("{}...", &long_sql[..20])));
    assert!(!prompts[0].contains(&long_sql));
}

#[tokio::test]
async fn test_enrich_scores_cards_and_records_not_found() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(
        &dir,
        "final_reports.csv",
        "metabase_report_id,report_name,owner\n10,Revenue,finance\n11,Deleted,\n12,Flaky,ops\n13,,nan\n",
    );
    let config = config(&dir, &catalog);
    let plan = plan(JobKind::Enrich, &config);

    let cards = FakeCards {
        errors: vec![12],
        ..FakeCards::default()
    }
    .with_card(json!({
        "id": 10,
        "name": "Revenue",
        "last_query_start": "2024-05-01T10:00:00Z",
        "dashboard_count": 2,
        "parameter_usage_count": 9,
        "updated_at": "2024-04-01T00:00:00Z"
    }))
    .with_card(json!({
        "id": 13,
        "name": "Dormant",
        "last_query_start": "2021-01-01T00:00:00Z"
    }));

    let processor = EnrichProcessor::new(&cards)
        .with_reference_time(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

    let prepared = plan.prepare::<CardRef>().await.unwrap();
    let report = plan
        .execute(prepared, &processor, ShutdownCoordinator::new(), Arc::new(NoopProgress))
        .await
        .unwrap();

    assert_eq!(report.newly_completed, 2);
    assert_eq!(report.newly_failed, 2);

    let state = reload(&plan).await;
    let revenue = state.result(WorkKey::new(10)).unwrap();
    assert_eq!(revenue.fields.get("activity_score"), Some("15"));
    assert_eq!(revenue.fields.get("is_recently_used"), Some("true"));
    assert_eq!(revenue.fields.get("dashboard_count"), Some("2"));
    assert_eq!(revenue.fields.get("updated_at"), Some("2024-04-01T00:00:00Z"));

    assert_eq!(revenue.fields.get("owner"), Some("finance"));

    let dormant = state.result(WorkKey::new(13)).unwrap();
    assert_eq!(dormant.fields.get("report_name"), Some("Dormant"));
    assert_eq!(dormant.fields.get("owner"), Some(""));
    assert_eq!(dormant.fields.get("activity_score"), Some("0"));
    assert_eq!(dormant.fields.get("is_recently_used"), Some("false"));

    let missing = state.failure(WorkKey::new(11)).unwrap();
    assert_eq!(missing.kind, FailureKind::NotFound);
    assert_eq!(missing.context.as_deref(), Some("Deleted"));
    assert_eq!(
        state.failure(WorkKey::new(12)).unwrap().kind,
        FailureKind::ServiceError
    );

    let results = std::fs::read_to_string(plan.layout.results_path()).unwrap();
    assert!(results.starts_with("metabase_report_id,report_name,owner,activity_score,"));
}

#[tokio::test]
async fn test_fetch_records_sql() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "cards.csv", "report_id\n5\n6\n");
    let config = config(&dir, &catalog);
    let plan = plan(JobKind::Fetch, &config);

    let cards = FakeCards::default()
        .with_card(json!({
            "id": 5,
            "name": "Orders",
            "dataset_query": {"type": "native", "native": {"query": "SELECT * FROM orders"}}
        }))
        .with_card(json!({
            "id": 6,
            "name": "GUI",
            "dataset_query": {"type": "query", "query": {"source-table": 2}}
        }));
    let processor = FetchProcessor::new(&cards);

    let prepared = plan.prepare::<CardRef>().await.unwrap();
    let report = plan
        .execute(prepared, &processor, ShutdownCoordinator::new(), Arc::new(NoopProgress))
        .await
        .unwrap();
    assert_eq!(report.newly_completed, 2);

    let state = reload(&plan).await;
    assert_eq!(
        state.result(WorkKey::new(5)).unwrap().fields.get("sql_query"),
        Some("SELECT * FROM orders")
    );
    let gui = state.result(WorkKey::new(6)).unwrap();
    assert!(gui.fields.get("sql_query").unwrap().starts_with("GUI Query:"));
    assert_eq!(gui.fields.get("query_type"), Some("query"));
}

#[tokio::test]
async fn test_drive_with_limit_and_no_prompt() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", REPORTS);
    let config = config(&dir, &catalog);
    let plan = reportctx::JobPlan::from_config(
        JobKind::Summarize,
        &config,
        &reportctx::RunOverrides {
            limit: Some(2),
            ..Default::default()
        },
    )
    .unwrap();

    let summarizer = FakeSummarizer::default();
    let processor = SummarizeProcessor::new(&summarizer, 2000);
    let options = RunOptions {
        assume_yes: true,
        ..RunOptions::default()
    };

    let report = drive::<ReportPayload, _>(&plan, &processor, &options, ShutdownCoordinator::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.newly_completed, 2);
    assert!(report.committed);
}

#[tokio::test]
async fn test_corrupt_store_refuses_to_start() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(&dir, "reports.csv", REPORTS);
    let config = config(&dir, &catalog);
    let plan = plan(JobKind::Summarize, &config);

    std::fs::create_dir_all(&plan.layout.dir).unwrap();
    std::fs::write(plan.layout.results_path(), "not,a,result,table\n1,2,3,4\n").unwrap();

    let err = plan.prepare::<ReportPayload>().await.unwrap_err();
    assert!(err.is_startup_error());
}
