//! Batch processing of a [`ProcessingJob`] against one browser session.
//!
//! A job runs on its own tokio task. The control calls only flip the state in
//! a watch channel; the worker checks it before every item, so `pause` and
//! `stop` take effect once the in-flight item is done.

use crate::login::LoginGate;
use crate::navigator::{ItemOutcome, SiteNavigator};
use crate::report::{CurrentItem, RunEvent, RunShared, RunStatus, StatusReporter};
use crate::{Error, FieldGenerator, Result, SessionSlot};
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use stelshop_browser::BrowserSession;
use stelshop_core::job::{JobReader, JobSettings, ProcessingJob, ProductItem};
use stelshop_core::stats::{OutcomeRecord, ProcessingState};
use tokio::sync::{OwnedMutexGuard, broadcast, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Pause between two items, skipped after the last one
    pub item_delay: Duration,
    pub event_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_secs(2),
            event_capacity: 256,
        }
    }
}

/// Who owns the next or current run. `start` and `stop` only change it
/// while holding the lock, so a stop can never slip between the two.
#[derive(Default)]
struct Lifecycle {
    worker: Option<JoinHandle<()>>,
    /// A `start` is past its checks and waiting on the login gate
    start_pending: bool,
}

impl Lifecycle {
    fn worker_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

pub struct BatchProcessor<S, N> {
    slot: SessionSlot<S>,
    navigator: Arc<N>,
    generator: Arc<dyn FieldGenerator>,
    login_gate: LoginGate,
    config: ProcessorConfig,
    shared: Arc<RunShared>,
    lifecycle: Mutex<Lifecycle>,
}

impl<S, N> BatchProcessor<S, N>
where
    S: BrowserSession + 'static,
    N: SiteNavigator<S> + 'static,
{
    pub fn new(
        slot: SessionSlot<S>,
        navigator: N,
        generator: Arc<dyn FieldGenerator>,
        config: ProcessorConfig,
    ) -> Self {
        let shared = Arc::new(RunShared::new(config.event_capacity));
        Self {
            slot,
            navigator: Arc::new(navigator),
            generator,
            login_gate: LoginGate::new(),
            config,
            shared,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn with_login_gate(mut self, login_gate: LoginGate) -> Self {
        self.login_gate = login_gate;
        self
    }

    pub fn reporter(&self) -> StatusReporter {
        StatusReporter::new(Arc::clone(&self.shared))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> ProcessingState {
        self.shared.state()
    }

    pub fn status(&self) -> RunStatus {
        self.shared.status()
    }

    pub fn export_stats(&self, path: &Path) -> Result<()> {
        self.reporter().export_stats(path)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate the job, confirm login and start processing in the background.
    ///
    /// A `stop` that arrives while the login check is pending cancels the
    /// start, which then fails with `InvalidTransition`.
    pub async fn start(&self, job: ProcessingJob) -> Result<()> {
        JobReader::validate(&job).map_err(|e| match e {
            stelshop_core::Error::InvalidJob(message) => Error::InvalidJob(message),
            other => Error::Core(other),
        })?;

        {
            let mut lifecycle = self.lifecycle();
            let state = self.state();
            if lifecycle.start_pending
                || lifecycle.worker_active()
                || matches!(state, ProcessingState::Running | ProcessingState::Paused)
            {
                return Err(Error::AlreadyRunning);
            }
            lifecycle.start_pending = true;
        }

        let session = match self.logged_in_session().await {
            Ok(session) => session,
            Err(e) => {
                self.lifecycle().start_pending = false;
                return Err(e);
            }
        };

        let mut lifecycle = self.lifecycle();
        if !std::mem::take(&mut lifecycle.start_pending) {
            tracing::info!("Stop requested before the job started");
            return Err(Error::InvalidTransition {
                action: "start",
                state: self.state(),
            });
        }

        let total = job.len();
        {
            let mut snapshot = self.shared.snapshot();
            *snapshot = Default::default();
            snapshot.total = total;
            snapshot.started_at = Some(Utc::now());
            snapshot.browser_alive = true;
            snapshot.uptime = session.uptime();
        }
        self.shared.control.send_replace(ProcessingState::Running);
        tracing::info!("Starting job with {} item(s)", total);
        self.shared.emit(RunEvent::Started { total });

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            navigator: Arc::clone(&self.navigator),
            generator: Arc::clone(&self.generator),
            item_delay: self.config.item_delay,
        };
        lifecycle.worker = Some(tokio::spawn(worker.run(session, job)));
        Ok(())
    }

    /// Take the session and make sure the operator is signed in
    async fn logged_in_session(&self) -> Result<OwnedMutexGuard<S>> {
        let mut session = self.slot.try_acquire()?;
        if !self.login_gate.check_logged_in(&mut *session).await? {
            return Err(Error::NotAuthenticated);
        }
        Ok(session)
    }

    /// Hold the run after the in-flight item
    pub fn pause(&self) -> Result<()> {
        let paused = self.shared.control.send_if_modified(|state| {
            if *state == ProcessingState::Running {
                *state = ProcessingState::Paused;
                true
            } else {
                false
            }
        });
        if !paused {
            return Err(Error::InvalidTransition {
                action: "pause",
                state: self.state(),
            });
        }
        tracing::info!("Processing paused");
        self.shared.emit(RunEvent::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let resumed = self.shared.control.send_if_modified(|state| {
            if *state == ProcessingState::Paused {
                *state = ProcessingState::Running;
                true
            } else {
                false
            }
        });
        if !resumed {
            return Err(Error::InvalidTransition {
                action: "resume",
                state: self.state(),
            });
        }
        tracing::info!("Processing resumed");
        self.shared.emit(RunEvent::Resumed);
        Ok(())
    }

    /// Stop after the in-flight item, or cancel a start still waiting on
    /// login. Stopping twice is a no-op.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        lifecycle.start_pending = false;
        let previous = self.shared.control.send_replace(ProcessingState::Stopped);
        if previous == ProcessingState::Stopped {
            return;
        }
        tracing::info!("Stop requested");

        // With a worker alive it sends the terminal event once the item ends
        if !lifecycle.worker_active() {
            let stats = self.shared.snapshot().stats();
            self.shared.finish(RunEvent::Stopped(stats));
        }
    }

    /// Wait for the current run's worker to exit
    pub async fn wait(&self) {
        let handle = self.lifecycle().worker.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Processing task failed: {}", e);
            }
        }
    }
}

/// The per-run task: owns the session guard until the job ends
struct Worker<N> {
    shared: Arc<RunShared>,
    navigator: Arc<N>,
    generator: Arc<dyn FieldGenerator>,
    item_delay: Duration,
}

impl<N> Worker<N> {
    async fn run<S>(self, mut session: OwnedMutexGuard<S>, job: ProcessingJob)
    where
        S: BrowserSession,
        N: SiteNavigator<S>,
    {
        let mut control = self.shared.control.subscribe();
        let total = job.len();

        for (index, item) in job.items.iter().enumerate() {
            if wait_until_runnable(&mut control).await == ProcessingState::Stopped {
                tracing::info!("Stopping before item {} of {}", index + 1, total);
                break;
            }

            if !self.check_browser(&mut *session).await {
                self.fail("Browser closed unexpectedly".to_string());
                return;
            }

            {
                let mut snapshot = self.shared.snapshot();
                snapshot.current_item = Some(CurrentItem {
                    sku: item.sku.clone(),
                    index,
                });
            }
            tracing::info!("Processing {} ({}/{})", item.sku, index + 1, total);
            self.shared.emit(RunEvent::ItemStarted {
                sku: item.sku.clone(),
                index,
            });

            let record = match self.process_item(&mut *session, item, &job.settings).await {
                Ok(record) => record,
                Err(e) => {
                    self.fail(e.to_string());
                    return;
                }
            };

            if record.success {
                tracing::info!("{}: {}", record.sku, record.message);
            } else {
                tracing::warn!("{} failed: {}", record.sku, record.message);
            }
            {
                let mut snapshot = self.shared.snapshot();
                snapshot.outcomes.push(record.clone());
                snapshot.current_item = None;
            }
            self.shared.emit(RunEvent::ItemCompleted(record));

            if index + 1 < total && !self.item_delay.is_zero() {
                // Any control change cuts the delay short
                let _ = tokio::time::timeout(self.item_delay, control.changed()).await;
            }
        }

        let previous = self.shared.control.send_replace(ProcessingState::Stopped);
        let stats = self.shared.snapshot().stats();
        if previous == ProcessingState::Stopped {
            tracing::info!(
                "Job stopped: {} processed, {} failed, {} not started",
                stats.processed,
                stats.failed,
                stats.remaining()
            );
            self.shared.finish(RunEvent::Stopped(stats));
        } else {
            tracing::info!(
                "Job completed: {} processed, {} failed",
                stats.processed,
                stats.failed
            );
            self.shared.finish(RunEvent::Completed(stats));
        }
    }

    /// Check the browser before an item and record what the status shows
    async fn check_browser<S: BrowserSession>(&self, session: &mut S) -> bool {
        let alive = session.is_alive().await;
        let current_url = if alive {
            session.current_url().await.ok().flatten()
        } else {
            None
        };
        let mut snapshot = self.shared.snapshot();
        snapshot.browser_alive = alive;
        snapshot.uptime = session.uptime();
        if current_url.is_some() {
            snapshot.current_url = current_url;
        }
        alive
    }

    /// Outcome for one item; `Err` only when the session is gone
    async fn process_item<S>(
        &self,
        session: &mut S,
        item: &ProductItem,
        settings: &JobSettings,
    ) -> stelshop_browser::Result<OutcomeRecord>
    where
        S: BrowserSession,
        N: SiteNavigator<S>,
    {
        let mut fields = item.fields.clone();
        if settings.use_ai {
            match self.generator.generate(item).await {
                Ok(generated) => fields = fields.merged_with(&generated),
                Err(e) => {
                    return Ok(OutcomeRecord::failed(&item.sku, "generate", e.to_string(), None));
                }
            }
        }
        if !settings.update_seo {
            fields = fields.without_seo();
        }
        if fields.is_empty() {
            return Ok(OutcomeRecord::failed(
                &item.sku,
                "prepare",
                "No field values to write",
                None,
            ));
        }

        match self.navigator.update_product(session, item, &fields).await? {
            ItemOutcome::Updated { fields } => Ok(OutcomeRecord::succeeded(
                &item.sku,
                format!("Updated {}", fields.join(", ")),
            )),
            ItemOutcome::Failed(failure) => Ok(OutcomeRecord::failed(
                &item.sku,
                failure.step.as_str(),
                failure.message,
                failure.screenshot,
            )),
        }
    }

    fn fail(&self, message: String) {
        tracing::error!("Job aborted: {}", message);
        self.shared.control.send_replace(ProcessingState::Stopped);
        {
            let mut snapshot = self.shared.snapshot();
            snapshot.fatal_error = Some(message.clone());
            snapshot.browser_alive = false;
        }
        self.shared.finish(RunEvent::Fatal { message });
    }
}

/// Block while paused; returns `Running` or `Stopped`
async fn wait_until_runnable(control: &mut watch::Receiver<ProcessingState>) -> ProcessingState {
    loop {
        let state = *control.borrow_and_update();
        match state {
            ProcessingState::Running | ProcessingState::Stopped => return state,
            ProcessingState::Paused | ProcessingState::Idle => {
                if control.changed().await.is_err() {
                    return ProcessingState::Stopped;
                }
            }
        }
    }
}
