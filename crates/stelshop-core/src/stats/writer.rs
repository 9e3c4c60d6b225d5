use super::types::StatsExport;
use crate::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub struct StatsWriter;

impl StatsWriter {
    /// Write a statistics export to a file, creating parent directories
    pub fn to_file(export: &StatsExport, path: &Path) -> Result<()> {
        tracing::debug!("Writing statistics export to: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, export)?;

        tracing::info!(
            "Wrote statistics export with {} outcomes to {}",
            export.outcomes.len(),
            path.display()
        );

        Ok(())
    }

    /// Convert a statistics export to a JSON string
    pub fn to_string(export: &StatsExport) -> Result<String> {
        Ok(serde_json::to_string_pretty(export)?)
    }
}

pub struct StatsReader;

impl StatsReader {
    /// Read a statistics export written by [`StatsWriter`]
    pub fn from_file(path: &Path) -> Result<StatsExport> {
        tracing::debug!("Reading statistics export from: {}", path.display());

        let file = File::open(path)?;
        let export: StatsExport = serde_json::from_reader(BufReader::new(file))?;
        Ok(export)
    }
}
