//! Business-context generation for report SQL.
//!
//! The prompt asks the model to first pull metrics and filters out of the
//! SQL, then combine them with the report's name and description into a
//! fixed Markdown layout that [`parse_response`] reads back into columns.

use crate::catalog::ReportPayload;
use async_trait::async_trait;
use batch_checkpoint::{FailureKind, Fields, ItemFailure, ItemProcessor, WorkItem};
use llm::{LlmError, Summarizer};
use tracing::debug;

const BUSINESS_QUESTION: &str = "**Business Question:**";
const PRIMARY_METRICS: &str = "**Primary Metric(s):**";
const KEY_FILTERS: &str = "**Key Filters";
const FINAL_SUMMARY: &str = "**Final Summary:**";

/// Structured sections of a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessContext {
    pub business_question: String,
    /// One metric per line.
    pub primary_metrics: String,
    /// One filter per line.
    pub key_filters: String,
    pub final_summary: String,
}

impl BusinessContext {
    pub fn is_empty(&self) -> bool {
        self.business_question.is_empty()
            && self.primary_metrics.is_empty()
            && self.key_filters.is_empty()
            && self.final_summary.is_empty()
    }
}

pub struct SummarizeProcessor<S> {
    summarizer: S,
    max_sql_chars: usize,
}

impl<S: Summarizer> SummarizeProcessor<S> {
    pub fn new(summarizer: S, max_sql_chars: usize) -> Self {
        Self {
            summarizer,
            max_sql_chars,
        }
    }
}

#[async_trait]
impl<S: Summarizer> ItemProcessor<ReportPayload> for SummarizeProcessor<S> {
    async fn process(&self, item: &WorkItem<ReportPayload>) -> Result<Fields, ItemFailure> {
        let payload = &item.payload;
        let name = payload.report_name.as_deref().ok_or_else(|| {
            ItemFailure::new(FailureKind::MalformedPayload, "Missing report name")
        })?;
        let sql = payload.sql_query.as_deref().ok_or_else(|| {
            ItemFailure::new(FailureKind::MalformedPayload, "Missing SQL query")
                .with_context(name)
        })?;

        let prompt = build_prompt(name, payload.description.as_deref(), sql, self.max_sql_chars);
        let response = self
            .summarizer
            .summarize(&prompt)
            .await
            .map_err(|e| failure_from_llm(e).with_context(name))?;

        let context = parse_response(&response);
        if context.is_empty() {
            debug!(key = %item.key, "Response did not follow the expected layout");
        }

        Ok(Fields::new()
            .with("original_report_name", name)
            .with("original_description", payload.description.as_deref().unwrap_or(""))
            .with("original_sql_query", sql)
            .with("business_question", context.business_question)
            .with("primary_metrics", context.primary_metrics)
            .with("key_filters", context.key_filters)
            .with("final_summary", context.final_summary)
            .with("raw_response", response))
    }
}

/// Map a summarizer error onto the failure taxonomy.
pub fn failure_from_llm(err: LlmError) -> ItemFailure {
    let kind = match &err {
        LlmError::ContentBlocked(_) => FailureKind::ContentRejected,
        LlmError::Timeout(_) => FailureKind::Timeout,
        LlmError::HttpError(e) if e.is_timeout() => FailureKind::Timeout,
        _ => FailureKind::ServiceError,
    };
    ItemFailure::new(kind, err.to_string())
}

/// Render the prompt for one report. SQL beyond `max_sql_chars`
/// characters is cut and marked with `...`.
pub fn build_prompt(
    report_name: &str,
    description: Option<&str>,
    sql: &str,
    max_sql_chars: usize,
) -> String {
    let sql = truncate_chars(sql, max_sql_chars);
    format!(
        "You are an expert business analyst who reads SQL fluently. You will get a report's \
name, its description and its SQL query.

Work in three steps:
1. Deconstruct the SQL: from the SELECT and WHERE clauses, identify the primary metrics and \
every business filter.
2. Synthesize: use the report name and description as the main context and combine them with \
those metrics and filters to state the business question the query answers.
3. Answer using exactly this Markdown layout:

{BUSINESS_QUESTION} [the business question]
{PRIMARY_METRICS}
- [metric]
- [metric]
{KEY_FILTERS} / Levers:**
- [filter]
- [filter]
{FINAL_SUMMARY} [one or two sentences]

Report Name: {report_name}
Description: {description}
SQL Query:
{sql}
",
        description = description.unwrap_or("Not provided"),
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Metrics,
    Filters,
}

/// Read the layout requested by [`build_prompt`] back out of a response.
///
/// Missing sections stay empty; the raw text is always kept alongside.
pub fn parse_response(text: &str) -> BusinessContext {
    let mut context = BusinessContext::default();
    let mut metrics = Vec::new();
    let mut filters = Vec::new();
    let mut section = None;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = after_marker(line, BUSINESS_QUESTION) {
            context.business_question = rest.to_string();
            section = None;
        } else if let Some(rest) = after_marker(line, PRIMARY_METRICS) {
            section = Some(Section::Metrics);
            push_non_empty(&mut metrics, rest);
        } else if line.contains(KEY_FILTERS) {
            section = Some(Section::Filters);
        } else if let Some(rest) = after_marker(line, FINAL_SUMMARY) {
            context.final_summary = rest.to_string();
            section = None;
        } else if let Some(bullet) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            match section {
                Some(Section::Metrics) => push_non_empty(&mut metrics, bullet),
                Some(Section::Filters) => push_non_empty(&mut filters, bullet),
                None => {}
            }
        }
    }

    context.primary_metrics = metrics.join("\n");
    context.key_filters = filters.join("\n");
    context
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker)
        .map(|index| line[index + marker.len()..].trim())
}

fn push_non_empty(target: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        target.push(value.to_string());
    }
}
