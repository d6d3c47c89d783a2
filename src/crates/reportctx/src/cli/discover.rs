//! `reportctx discover` and `reportctx map` handlers

use crate::cli::helpers::shorten;
use crate::cli::run::metabase_client;
use crate::config::ReportctxConfig;
use crate::discover::{discover, write_catalog, DiscoverOptions, Discovery};
use crate::error::Result;
use crate::jobs::{JobKind, JobPlan, RunOverrides};
use crate::mapping::{map_results, MappingReport};
use batch_checkpoint::ShutdownCoordinator;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// CLI flags layered over `[discover]`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverOverrides {
    pub output: Option<PathBuf>,
    pub exclude: Option<PathBuf>,
    pub min_activity_score: Option<u32>,
    pub all_query_types: bool,
}

#[derive(Tabled)]
struct TopRow {
    #[tabled(rename = "Card")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Score")]
    score: u32,
}

/// Handle discover command: list, score and write a new catalog
pub async fn handle_discover(
    config: &ReportctxConfig,
    overrides: DiscoverOverrides,
    shutdown: ShutdownCoordinator,
) -> Result<Discovery> {
    let mut settings = config.discover.clone();
    if let Some(output) = overrides.output {
        settings.output = output;
    }
    if let Some(exclude) = overrides.exclude {
        settings.exclude = Some(exclude);
    }
    if let Some(score) = overrides.min_activity_score {
        settings.min_activity_score = score;
    }
    if overrides.all_query_types {
        settings.native_only = false;
    }

    let options = DiscoverOptions::from_config(&settings)?;
    let client = metabase_client(&config.metabase).await?;
    let discovery = discover(&client, &options, &shutdown).await?;
    write_catalog(&settings.output, &discovery.reports).await?;

    print_discovery(&discovery, &settings.output);
    Ok(discovery)
}

fn print_discovery(discovery: &Discovery, output: &Path) {
    let stats = &discovery.stats;
    let heading = if stats.interrupted {
        "Discovery interrupted".yellow().bold()
    } else {
        "Discovery complete".green().bold()
    };
    println!("{}", heading);
    println!("  Cards listed:     {}", stats.listed);
    println!("  Archived:         {}", stats.archived);
    println!("  Already analyzed: {}", stats.excluded);
    println!("  Inactive:         {}", stats.inactive);
    println!("  Not SQL:          {}", stats.non_sql);
    if stats.failed > 0 {
        println!("{}", format!("  Lookup failures:  {}", stats.failed).red());
    }
    println!("  New reports:      {}", discovery.reports.len());
    println!("  Output:           {}", output.display());

    let top: Vec<TopRow> = discovery
        .top(5)
        .into_iter()
        .map(|report| TopRow {
            id: report.report_id,
            name: shorten(&report.report_name, 50),
            collection: shorten(&report.collection_name, 30),
            score: report.activity_score,
        })
        .collect();
    if !top.is_empty() {
        println!("\n{}", "Most active new reports".bold());
        println!("{}", Table::new(top));
    }
}

/// Handle map command: put card ids next to positional summarize keys
pub async fn handle_map(
    config: &ReportctxConfig,
    overrides: &RunOverrides,
    id_column: Option<String>,
    output: Option<PathBuf>,
) -> Result<MappingReport> {
    let plan = JobPlan::from_config(JobKind::Summarize, config, overrides)?;
    let id_column = id_column.unwrap_or_else(|| config.mapping.id_column.clone());
    let output = output
        .or_else(|| config.mapping.output.clone())
        .unwrap_or_else(|| default_mapping_output(&plan));

    let report = map_results(&plan, &id_column, &output).await?;

    println!("{}", "Mapping complete".green().bold());
    println!("  Results:     {}", report.rows);
    println!("  Mapped:      {}", report.mapped);
    println!("  Mapped rate: {:.1}%", report.mapped_pct());
    println!("  Output:      {}", report.output.display());
    Ok(report)
}

/// `<store dir>/<stem>_mapped.csv`, next to the results it maps.
pub fn default_mapping_output(plan: &JobPlan) -> PathBuf {
    plan.layout
        .dir
        .join(format!("{}_mapped.csv", plan.layout.stem))
}
