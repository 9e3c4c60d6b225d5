use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use stelshop_core::stats::{
    OutcomeRecord, ProcessingState, RunStatistics, StatsExport, StatsWriter,
};
use tokio::sync::{broadcast, watch};

/// Notifications published while a job runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started { total: usize },
    ItemStarted { sku: String, index: usize },
    ItemCompleted(OutcomeRecord),
    Paused,
    Resumed,
    Completed(RunStatistics),
    Stopped(RunStatistics),
    Fatal { message: String },
}

impl RunEvent {
    /// Completed, Stopped and Fatal end a run; exactly one is sent per run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::Completed(_) | RunEvent::Stopped(_) | RunEvent::Fatal { .. }
        )
    }
}

/// The item being processed right now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentItem {
    pub sku: String,
    /// Zero-based position in the job
    pub index: usize,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: ProcessingState,
    pub current_item: Option<CurrentItem>,
    pub stats: RunStatistics,
    pub browser_alive: bool,
    pub current_url: Option<String>,
    /// Browser uptime at the last check
    pub uptime: Option<Duration>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failed outcomes so far
    pub errors: Vec<OutcomeRecord>,
    pub fatal_error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct RunSnapshot {
    pub total: usize,
    pub current_item: Option<CurrentItem>,
    pub outcomes: Vec<OutcomeRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fatal_error: Option<String>,
    pub browser_alive: bool,
    pub current_url: Option<String>,
    pub uptime: Option<Duration>,
    pub terminal_sent: bool,
}

impl RunSnapshot {
    pub fn stats(&self) -> RunStatistics {
        RunStatistics::from_outcomes(self.total, &self.outcomes)
    }
}

/// State shared between the processor's control surface and its worker
pub(crate) struct RunShared {
    pub control: watch::Sender<ProcessingState>,
    pub events: broadcast::Sender<RunEvent>,
    snapshot: Mutex<RunSnapshot>,
}

impl RunShared {
    pub fn new(event_capacity: usize) -> Self {
        let (control, _) = watch::channel(ProcessingState::Idle);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            control,
            events,
            snapshot: Mutex::new(RunSnapshot::default()),
        }
    }

    pub fn state(&self) -> ProcessingState {
        *self.control.borrow()
    }

    /// A panicked worker must not take status reporting down with it
    pub fn snapshot(&self) -> MutexGuard<'_, RunSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn emit(&self, event: RunEvent) {
        tracing::debug!("Run event: {:?}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Send a run's terminal event unless one was already sent
    pub fn finish(&self, event: RunEvent) {
        {
            let mut snapshot = self.snapshot();
            if snapshot.terminal_sent {
                return;
            }
            snapshot.terminal_sent = true;
            snapshot.current_item = None;
            snapshot.finished_at = Some(Utc::now());
        }
        self.emit(event);
    }

    pub fn status(&self) -> RunStatus {
        let state = self.state();
        let snapshot = self.snapshot();
        RunStatus {
            state,
            current_item: snapshot.current_item.clone(),
            stats: snapshot.stats(),
            browser_alive: snapshot.browser_alive,
            current_url: snapshot.current_url.clone(),
            uptime: snapshot.uptime,
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
            errors: snapshot
                .outcomes
                .iter()
                .filter(|o| !o.success)
                .cloned()
                .collect(),
            fatal_error: snapshot.fatal_error.clone(),
        }
    }

    pub fn export(&self) -> StatsExport {
        let state = self.state();
        let snapshot = self.snapshot();
        StatsExport {
            exported_at: Utc::now(),
            state,
            stats: snapshot.stats(),
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
            fatal_error: snapshot.fatal_error.clone(),
            outcomes: snapshot.outcomes.clone(),
        }
    }
}

/// Read-only handle on a processor's run, usable from any thread
#[derive(Clone)]
pub struct StatusReporter {
    shared: Arc<RunShared>,
}

impl StatusReporter {
    pub(crate) fn new(shared: Arc<RunShared>) -> Self {
        Self { shared }
    }

    pub fn status(&self) -> RunStatus {
        self.shared.status()
    }

    pub fn stats(&self) -> RunStatistics {
        self.shared.snapshot().stats()
    }

    pub fn outcomes(&self) -> Vec<OutcomeRecord> {
        self.shared.snapshot().outcomes.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    /// Write the run's statistics and outcomes as pretty JSON
    pub fn export_stats(&self, path: &Path) -> Result<()> {
        let export = self.shared.export();
        StatsWriter::to_file(&export, path)?;
        tracing::info!("Statistics exported to {}", path.display());
        Ok(())
    }
}
