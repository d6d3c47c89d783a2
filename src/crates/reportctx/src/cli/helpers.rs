//! Shared printing and prompting helpers for CLI handlers

use crate::error::Result;
use crate::jobs::JobPlan;
use batch_checkpoint::{GapReport, RunReport};
use colored::Colorize;
use std::io::{BufRead, Write};

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    confirm_with(question, &mut stdin.lock(), &mut std::io::stdout())
}

/// [`confirm`] over arbitrary streams.
pub fn confirm_with<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{} [y/N] ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Cut `text` to `max_chars`, marking the cut with `...`.
pub fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

/// Print the gap analysis for a job.
pub fn print_gap_report(plan: &JobPlan, gaps: &GapReport) {
    println!("{}", format!("Gap analysis: {}", plan.kind).bold());
    println!("  Catalog:     {}", plan.catalog_path.display());
    println!("  Store:       {}", plan.layout.results_path().display());
    println!("  Total:       {}", gaps.total);
    println!("  Completed:   {}", gaps.completed);

    let missing = gaps.missing.len();
    let missing_line = format!("  Missing:     {}", missing);
    if missing == 0 {
        println!("{}", missing_line.green());
    } else {
        println!("{}", missing_line.yellow());
        println!("  Ranges:      {}", gaps.missing_ranges());
    }
    println!("  Completion:  {:.1}%", gaps.completion_pct());
}

/// Print the end-of-run summary.
pub fn print_run_summary(report: &RunReport) {
    println!();
    let heading = if report.interrupted {
        "Run interrupted".yellow().bold()
    } else {
        "Run complete".green().bold()
    };
    println!("{}", heading);
    println!("  Catalog size:          {}", report.catalog_total);
    println!("  Previously completed:  {}", report.previously_completed);
    println!("  Newly completed:       {}", report.newly_completed);

    let failed = format!("  Newly failed:          {}", report.newly_failed);
    if report.newly_failed > 0 {
        println!("{}", failed.red());
    } else {
        println!("{}", failed);
    }
    if report.skipped > 0 {
        println!("  Skipped:               {}", report.skipped);
    }
    println!("  Completion:            {:.1}%", report.completion_pct());
    println!("  Checkpoints written:   {}", report.checkpoints_written);
    println!("  Output:                {}", report.store_path.display());
    println!("  Elapsed:               {:.1}s", report.elapsed.as_secs_f64());

    for backup in &report.emergency_backups {
        println!("  {} {}", "Emergency backup:".yellow(), backup.display());
    }
    if !report.committed {
        println!(
            "{}",
            "✗ Final state was NOT committed; recover from the emergency backups above".red().bold()
        );
    }
}
