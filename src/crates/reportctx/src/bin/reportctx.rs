//! reportctx CLI - checkpointed report enrichment
//!
//! Main entry point for the reportctx command-line tool.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use reportctx::cli::{DiscoverOverrides, RunOptions};
use reportctx::{JobKind, ReportctxError, RunOverrides};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "reportctx")]
#[command(about = "Checkpointed batch jobs for BI report catalogs", long_about = None)]
#[command(version = reportctx::VERSION)]
struct Cli {
    /// Config file layered over ~/.reportctx/reportctx.toml and ./reportctx.toml
    #[arg(short, long, global = true, env = "REPORTCTX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every catalog item missing from the result store
    Run {
        /// Job to run
        job: JobKind,

        #[command(flatten)]
        selection: Selection,

        /// Stop after this many items
        #[arg(short, long)]
        limit: Option<usize>,

        /// Concurrent workers (1 = sequential)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Flush the result store after this many items
        #[arg(short = 'k', long)]
        checkpoint_every: Option<usize>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Log every item instead of drawing a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show gap analysis and recorded failures without processing
    Status {
        /// Job to inspect
        job: JobKind,

        #[command(flatten)]
        selection: Selection,
    },

    /// Print the missing key ranges
    Gaps {
        /// Job to inspect
        job: JobKind,

        #[command(flatten)]
        selection: Selection,
    },

    /// Build a catalog of recently used cards that are not yet analyzed
    Discover {
        /// Catalog CSV to write (overrides [discover] output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV of already-analyzed reports to skip (overrides [discover] exclude)
        #[arg(long)]
        exclude: Option<PathBuf>,

        /// Minimum activity score (overrides [discover] min_activity_score)
        #[arg(long)]
        min_score: Option<u32>,

        /// Keep GUI-built questions as well as native SQL
        #[arg(long)]
        all_query_types: bool,
    },

    /// Write summarize results with their Metabase card ids
    Map {
        #[command(flatten)]
        selection: Selection,

        /// Catalog column holding the card id (overrides [mapping] id_column)
        #[arg(long)]
        id_column: Option<String>,

        /// Mapped CSV to write (overrides [mapping] output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Selection {
    /// Catalog CSV (overrides [catalog] path)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = reportctx::load_config(cli.config).await?;
    // Dropping the guard would stop the log file writer.
    let _log_guard = reportctx::init_logging(&config.logging)?;

    match cli.command {
        Commands::Run {
            job,
            selection,
            limit,
            workers,
            checkpoint_every,
            yes,
            no_progress,
        } => {
            // Create shutdown coordinator and install signal handlers
            let shutdown = batch_checkpoint::ShutdownCoordinator::new();
            let _signal_handler = shutdown.install_signal_handlers();

            let options = RunOptions {
                overrides: RunOverrides {
                    catalog: selection.catalog,
                    limit,
                    workers,
                    checkpoint_every,
                },
                assume_yes: yes,
                show_progress: !no_progress,
            };

            match reportctx::cli::handle_run(&config, job, options, shutdown).await {
                Ok(report) if !report.committed => {
                    eprintln!("{}", "✗ Final flush failed".red().bold());
                    Ok(ExitCode::FAILURE)
                }
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(ReportctxError::Aborted) => {
                    println!("{}", "Aborted, nothing was processed".yellow());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Status { job, selection } => {
            let overrides = RunOverrides {
                catalog: selection.catalog,
                ..RunOverrides::default()
            };
            reportctx::cli::handle_status(&config, job, &overrides).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Gaps { job, selection } => {
            let overrides = RunOverrides {
                catalog: selection.catalog,
                ..RunOverrides::default()
            };
            reportctx::cli::handle_gaps(&config, job, &overrides).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Discover {
            output,
            exclude,
            min_score,
            all_query_types,
        } => {
            let shutdown = batch_checkpoint::ShutdownCoordinator::new();
            let _signal_handler = shutdown.install_signal_handlers();

            let overrides = DiscoverOverrides {
                output,
                exclude,
                min_activity_score: min_score,
                all_query_types,
            };
            let discovery = reportctx::cli::handle_discover(&config, overrides, shutdown).await?;
            if discovery.stats.interrupted {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Map {
            selection,
            id_column,
            output,
        } => {
            let overrides = RunOverrides {
                catalog: selection.catalog,
                ..RunOverrides::default()
            };
            reportctx::cli::handle_map(&config, &overrides, id_column, output).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
