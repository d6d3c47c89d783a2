//! `reportctx run <job>` handler

use crate::catalog::{CardRef, ReportPayload};
use crate::cli::helpers::{confirm, print_gap_report, print_run_summary};
use crate::config::{LlmConfig, MetabaseConfig, ReportctxConfig};
use crate::error::{ReportctxError, Result};
use crate::jobs::{
    EnrichProcessor, FetchProcessor, JobKind, JobPlan, RunOverrides, SummarizeProcessor,
};
use crate::progress::ConsoleProgress;
use batch_checkpoint::{
    ItemProcessor, ProgressObserver, RunReport, ShutdownCoordinator, TracingProgress,
};
use colored::Colorize;
use llm::remote::GeminiClient;
use llm::{GenerationSettings, RemoteLlmConfig};
use metabase_client::MetabaseClient;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for one `run` invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub overrides: RunOverrides,
    /// Skip the confirmation prompt.
    pub assume_yes: bool,
    /// Draw a progress bar instead of logging every item.
    pub show_progress: bool,
}

/// Handle run command
pub async fn handle_run(
    config: &ReportctxConfig,
    kind: JobKind,
    options: RunOptions,
    shutdown: ShutdownCoordinator,
) -> Result<RunReport> {
    let plan = JobPlan::from_config(kind, config, &options.overrides)?;
    info!(job = %kind, catalog = %plan.catalog_path.display(), "Starting job");

    match kind {
        JobKind::Summarize => {
            let client = gemini_client(&config.llm)?;
            if !client.check_health().await? {
                warn!(model = %config.llm.model, "Gemini health check failed, continuing");
            }
            let processor = SummarizeProcessor::new(client, config.llm.max_sql_chars);
            drive::<ReportPayload, _>(&plan, &processor, &options, shutdown).await
        }
        JobKind::Enrich => {
            let client = metabase_client(&config.metabase).await?;
            drive::<CardRef, _>(&plan, &EnrichProcessor::new(client), &options, shutdown).await
        }
        JobKind::Fetch => {
            let client = metabase_client(&config.metabase).await?;
            drive::<CardRef, _>(&plan, &FetchProcessor::new(client), &options, shutdown).await
        }
    }
}

/// Gap analysis, confirmation, execution and summary for one plan.
pub async fn drive<P, Proc>(
    plan: &JobPlan,
    processor: &Proc,
    options: &RunOptions,
    shutdown: ShutdownCoordinator,
) -> Result<RunReport>
where
    P: DeserializeOwned + Send + Sync,
    Proc: ItemProcessor<P> + ?Sized,
{
    let prepared = plan.prepare::<P>().await?;
    print_gap_report(plan, &prepared.gaps);

    let missing = prepared.gaps.missing.len();
    if missing == 0 {
        println!("{}", "✓ Nothing to do, every catalog item is complete".green());
    } else if !options.assume_yes {
        let planned = plan
            .executor
            .batch_limit
            .map_or(missing, |limit| limit.min(missing));
        if !confirm(&format!("Process {} of {} missing items?", planned, missing))? {
            return Err(ReportctxError::Aborted);
        }
    }

    let observer: Arc<dyn ProgressObserver> = if options.show_progress {
        Arc::new(ConsoleProgress::new())
    } else {
        Arc::new(TracingProgress)
    };

    let report = plan.execute(prepared, processor, shutdown, observer).await?;
    print_run_summary(&report);
    Ok(report)
}

/// Build the Gemini client from the `[llm]` section.
pub fn gemini_client(config: &LlmConfig) -> Result<GeminiClient> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ReportctxError::Config(
            "llm.api_key is not set; export GEMINI_API_KEY or set it in reportctx.toml"
                .to_string(),
        )
    })?;
    let base_url = config
        .api_base
        .clone()
        .unwrap_or_else(|| llm::DEFAULT_BASE_URL.to_string());

    let remote = RemoteLlmConfig::new(api_key, base_url, config.model.clone())
        .with_timeout(Duration::from_secs(config.timeout_secs))
        .with_max_retries(config.max_retries)
        .with_generation(GenerationSettings {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            ..GenerationSettings::default()
        });

    Ok(GeminiClient::new(remote)?)
}

/// Build the Metabase client from the `[metabase]` section and check the
/// key before any work is queued.
pub async fn metabase_client(config: &MetabaseConfig) -> Result<MetabaseClient> {
    let base_url = config.base_url.clone().ok_or_else(|| {
        ReportctxError::Config(
            "metabase.base_url is not set; export METABASE_BASE_URL or set it in reportctx.toml"
                .to_string(),
        )
    })?;
    let api_key = config.api_key.clone().ok_or_else(|| {
        ReportctxError::Config(
            "metabase.api_key is not set; export METABASE_API_KEY or set it in reportctx.toml"
                .to_string(),
        )
    })?;

    let client = MetabaseClient::new(
        metabase_client::MetabaseConfig::new(base_url, api_key)
            .with_api_delay(Duration::from_millis(config.api_delay_ms))
            .with_request_timeout(Duration::from_secs(config.request_timeout_secs)),
    )?;
    client.test_connection().await?;
    Ok(client)
}
