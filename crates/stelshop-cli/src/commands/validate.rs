use crate::output::{OutputFormat, table_cell};
use anyhow::{Result, bail};
use std::path::Path;
use stelshop_core::job::{JobReader, ValidationReport};

/// Read a job file and collect its problems
pub fn validate_job(file: &Path) -> Result<ValidationReport> {
    let job = JobReader::from_file(file)?;
    Ok(JobReader::check(&job))
}

pub fn execute(file: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Validating job file: {}", file.display());

    let report = validate_job(file)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => output_table(&report),
        OutputFormat::Pretty => output_pretty(file, &report),
    }

    if !report.is_valid() {
        bail!("Job has {} error(s)", report.errors.len());
    }
    Ok(())
}

fn output_pretty(file: &Path, report: &ValidationReport) {
    use console::style;

    println!("\n{}", style(format!("Job: {}", file.display())).bold().cyan());
    println!("  Items:    {}", style(report.total_items).yellow());

    if !report.errors.is_empty() {
        println!("\n{}", style("Errors:").bold().red());
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
    if !report.warnings.is_empty() {
        println!("\n{}", style("Warnings:").bold().yellow());
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }

    if report.is_valid() {
        println!("\n{}", style("Job is valid").green());
    }
    println!();
}

fn output_table(report: &ValidationReport) {
    println!("Level,Message");
    for error in &report.errors {
        println!("error,{}", table_cell(error));
    }
    for warning in &report.warnings {
        println!("warning,{}", table_cell(warning));
    }
}
