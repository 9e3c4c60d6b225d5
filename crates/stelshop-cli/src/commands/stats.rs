use crate::output::{OutputFormat, table_cell};
use anyhow::Result;
use std::path::Path;
use stelshop_core::stats::{StatsExport, StatsReader};

pub fn execute(file: &Path, failures_only: bool, format: OutputFormat) -> Result<()> {
    tracing::info!("Reading statistics export: {}", file.display());

    let export = StatsReader::from_file(file)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&export)?),
        OutputFormat::Table => output_table(&export, failures_only),
        OutputFormat::Pretty => output_pretty(&export, failures_only),
    }
    Ok(())
}

/// Elapsed run time as `1h 02m 03s`, `2m 22s` or `9s`
pub fn format_elapsed(export: &StatsExport) -> Option<String> {
    let seconds = (export.finished_at? - export.started_at?).num_seconds().max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    Some(match (h, m) {
        (0, 0) => format!("{}s", s),
        (0, _) => format!("{}m {:02}s", m, s),
        _ => format!("{}h {:02}m {:02}s", h, m, s),
    })
}

fn output_pretty(export: &StatsExport, failures_only: bool) {
    use console::style;

    println!("\n{}", style("Processing Statistics").bold().cyan());
    println!("{}", style("=====================").cyan());

    println!("\n{}", style("Summary:").bold());
    println!("  State:      {}", export.state);
    println!("  Total:      {}", export.stats.total);
    println!("  Processed:  {}", style(export.stats.processed).green());
    println!("  Failed:     {}", style(export.stats.failed).red());
    println!("  Remaining:  {}", export.stats.remaining());
    if let Some(started) = export.started_at {
        println!("  Started:    {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(elapsed) = format_elapsed(export) {
        println!("  Duration:   {}", elapsed);
    }
    if let Some(fatal) = &export.fatal_error {
        println!("  Aborted:    {}", style(fatal).red());
    }

    let outcomes: Vec<_> = export
        .outcomes
        .iter()
        .filter(|o| !failures_only || !o.success)
        .collect();
    if !outcomes.is_empty() {
        println!("\n{}", style("Outcomes:").bold());
    }
    for outcome in outcomes {
        let mark = if outcome.success {
            style("ok").green()
        } else {
            style("FAIL").red()
        };
        let step = outcome
            .step
            .as_deref()
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();
        println!("  {:<4} {:<20}{} {}", mark, outcome.sku, step, outcome.message);
        if let Some(screenshot) = &outcome.screenshot {
            println!("       screenshot: {}", style(screenshot.display()).dim());
        }
    }
    println!();
}

fn output_table(export: &StatsExport, failures_only: bool) {
    println!("Metric,Value");
    println!("State,{}", export.state);
    println!("Total,{}", export.stats.total);
    println!("Processed,{}", export.stats.processed);
    println!("Failed,{}", export.stats.failed);

    println!();
    println!("SKU,Success,Step,Message");
    for outcome in export
        .outcomes
        .iter()
        .filter(|o| !failures_only || !o.success)
    {
        println!(
            "{},{},{},{}",
            table_cell(&outcome.sku),
            outcome.success,
            outcome.step.as_deref().unwrap_or(""),
            table_cell(&outcome.message)
        );
    }
}
