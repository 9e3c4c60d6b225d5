use super::types::ProcessingJob;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub struct JobReader;

/// Problems found in a job file. Errors block processing, warnings do not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub total_items: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl JobReader {
    /// Read and parse a job file from the given path
    pub fn from_file(path: &Path) -> Result<ProcessingJob> {
        tracing::debug!("Reading job file from: {}", path.display());

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let job: ProcessingJob = serde_json::from_reader(reader)?;

        tracing::info!("Parsed job file with {} items", job.items.len());

        Ok(job)
    }

    /// Parse a job from a JSON string
    pub fn from_str(content: &str) -> Result<ProcessingJob> {
        let job: ProcessingJob = serde_json::from_str(content)?;
        tracing::debug!("Parsed job from string with {} items", job.items.len());
        Ok(job)
    }

    /// Inspect a job and collect every problem
    pub fn check(job: &ProcessingJob) -> ValidationReport {
        let mut report = ValidationReport {
            total_items: job.items.len(),
            ..Default::default()
        };

        if job.items.is_empty() {
            report.errors.push("Job contains no items".to_string());
        }

        let mut seen = HashSet::new();
        for (idx, item) in job.items.iter().enumerate() {
            let sku = item.sku.trim();
            if sku.is_empty() {
                report.errors.push(format!("Item {} has an empty SKU", idx));
                continue;
            }
            if !seen.insert(sku.to_string()) {
                report
                    .errors
                    .push(format!("Item {} duplicates SKU '{}'", idx, sku));
            }
            if item.name.trim().is_empty() {
                report
                    .warnings
                    .push(format!("Item {} ('{}') has no name", idx, sku));
            }
            if item.price.is_some_and(|p| p < 0.0) {
                report
                    .warnings
                    .push(format!("Item {} ('{}') has a negative price", idx, sku));
            }
            if item.stock.is_some_and(|s| s < 0) {
                report
                    .warnings
                    .push(format!("Item {} ('{}') has negative stock", idx, sku));
            }
            if !job.settings.use_ai && item.fields.is_empty() {
                report.warnings.push(format!(
                    "Item {} ('{}') has no field values and generation is off",
                    idx, sku
                ));
            }
        }

        report
    }

    /// Validate that a job can be processed
    pub fn validate(job: &ProcessingJob) -> Result<()> {
        let report = Self::check(job);
        for warning in &report.warnings {
            tracing::warn!("{}", warning);
        }
        match report.errors.first() {
            Some(first) => Err(Error::InvalidJob(first.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_job() {
        let job_json = r#"{
            "items": [{"sku": "GEN-100", "name": "Generador 100"}],
            "settings": {"use_ai": true, "update_seo": false}
        }"#;

        let job = JobReader::from_str(job_json).unwrap();
        assert_eq!(job.items.len(), 1);
        assert_eq!(job.items[0].sku, "GEN-100");
        assert!(job.settings.use_ai);
        assert!(!job.settings.update_seo);
    }

    #[test]
    fn test_validate_rejects_duplicate_sku() {
        let job_json = r#"{"items": [{"sku": "A"}, {"sku": "A"}]}"#;
        let job = JobReader::from_str(job_json).unwrap();

        let result = JobReader::validate(&job);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicates SKU"));
    }

    #[test]
    fn test_validate_rejects_empty_job() {
        let job = JobReader::from_str(r#"{"items": []}"#).unwrap();
        assert!(JobReader::validate(&job).is_err());
    }

    #[test]
    fn test_check_collects_warnings() {
        let job_json = r#"{"items": [{"sku": "A", "price": -1.0}]}"#;
        let job = JobReader::from_str(job_json).unwrap();

        let report = JobReader::check(&job);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("no name")));
        assert!(report.warnings.iter().any(|w| w.contains("negative price")));
    }
}
