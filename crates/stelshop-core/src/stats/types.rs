use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingState::Idle => write!(f, "Idle"),
            ProcessingState::Running => write!(f, "Running"),
            ProcessingState::Paused => write!(f, "Paused"),
            ProcessingState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Result of processing one product item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub sku: String,
    pub success: bool,
    pub message: String,
    /// Name of the step that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl OutcomeRecord {
    pub fn succeeded(sku: &str, message: impl Into<String>) -> Self {
        Self {
            sku: sku.to_string(),
            success: true,
            message: message.into(),
            step: None,
            timestamp: Utc::now(),
            screenshot: None,
        }
    }

    pub fn failed(
        sku: &str,
        step: &str,
        message: impl Into<String>,
        screenshot: Option<PathBuf>,
    ) -> Self {
        Self {
            sku: sku.to_string(),
            success: false,
            message: message.into(),
            step: Some(step.to_string()),
            timestamp: Utc::now(),
            screenshot,
        }
    }
}

/// Counters for a run, derived from its outcome records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

impl RunStatistics {
    pub fn new(total: usize) -> Self {
        Self {
            processed: 0,
            failed: 0,
            total,
        }
    }

    /// Recompute counters from the outcome list
    pub fn from_outcomes(total: usize, outcomes: &[OutcomeRecord]) -> Self {
        let processed = outcomes.iter().filter(|o| o.success).count();
        Self {
            processed,
            failed: outcomes.len() - processed,
            total,
        }
    }

    pub fn finished(&self) -> usize {
        self.processed + self.failed
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.finished())
    }

    pub fn is_complete(&self) -> bool {
        self.finished() == self.total
    }
}

/// Statistics export file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsExport {
    pub exported_at: DateTime<Utc>,
    pub state: ProcessingState,
    pub stats: RunStatistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    pub outcomes: Vec<OutcomeRecord>,
}

impl StatsExport {
    pub fn failures(&self) -> impl Iterator<Item = &OutcomeRecord> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_from_outcomes() {
        let outcomes = vec![
            OutcomeRecord::succeeded("A", "ok"),
            OutcomeRecord::failed("B", "save", "timed out", None),
            OutcomeRecord::succeeded("C", "ok"),
        ];

        let stats = RunStatistics::from_outcomes(4, &outcomes);

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.remaining(), 1);
        assert!(!stats.is_complete());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessingState::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
