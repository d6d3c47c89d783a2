//! Terminal progress bar for batch runs.

use batch_checkpoint::{ItemOutcome, ProgressObserver, ProgressUpdate, RunReport};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Draws an indicatif bar on stderr and prints checkpoint notices above it.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        Self { bar }
    }

    /// A bar that never draws, for non-interactive runs.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_start(&self, queued: usize) {
        self.bar.set_length(queued as u64);
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn on_item(&self, update: &ProgressUpdate) {
        self.bar.inc(1);
        let message = match update.outcome {
            ItemOutcome::Succeeded => format!("{} ok", update.key),
            ItemOutcome::Failed(kind) => format!("{} {}", update.key, kind),
        };
        self.bar.set_message(format!(
            "{} | {} ok, {} failed",
            message, update.succeeded, update.failed
        ));
    }

    fn on_checkpoint(&self, checkpoint: u64, committed: usize) {
        self.bar.println(format!(
            "{} checkpoint {} saved ({} results committed)",
            "✓".green(),
            checkpoint,
            committed
        ));
    }

    fn on_finish(&self, report: &RunReport) {
        let message = if report.interrupted {
            "interrupted".yellow().to_string()
        } else {
            "done".green().to_string()
        };
        self.bar.finish_with_message(message);
    }
}
