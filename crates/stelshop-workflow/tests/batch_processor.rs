use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stelshop_browser::{BrowserSession, SessionState};
use stelshop_core::job::{FieldValues, JobSettings, ProcessingJob, ProductItem};
use stelshop_core::stats::{ProcessingState, RunStatistics};
use stelshop_workflow::{
    BatchProcessor, Error, FailureKind, FieldGenerator, ItemOutcome, LoginGate, ProcessorConfig,
    RunEvent, SessionSlot, SiteNavigator, Step, StepFailure, TemplateFields,
};
use tokio::sync::{Semaphore, broadcast, mpsc};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct FakeSession {
    alive: Arc<AtomicBool>,
    logged_in: bool,
    /// First argument of every script run, i.e. the login markers
    script_args: Arc<Mutex<Vec<Value>>>,
    /// How long each script takes to answer
    script_delay: Duration,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, _url: &str) -> stelshop_browser::Result<()> {
        Ok(())
    }

    async fn screenshot(&mut self) -> stelshop_browser::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn execute_script(
        &mut self,
        _script: &str,
        args: &[Value],
    ) -> stelshop_browser::Result<Value> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(stelshop_browser::Error::SessionClosed);
        }
        if let Some(first) = args.first() {
            self.script_args.lock().unwrap().push(first.clone());
        }
        if !self.script_delay.is_zero() {
            tokio::time::sleep(self.script_delay).await;
        }
        Ok(json!(self.logged_in))
    }

    async fn current_url(&mut self) -> stelshop_browser::Result<Option<String>> {
        Ok(Some("https://app.stelorder.com/app/#main_catalogo".to_string()))
    }

    async fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> stelshop_browser::Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> SessionState {
        if self.alive.load(Ordering::SeqCst) {
            SessionState::Active
        } else {
            SessionState::Closed
        }
    }

    fn uptime(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }
}

#[derive(Clone)]
enum Plan {
    Succeed,
    Fail(Step, FailureKind),
    /// Save the item, then the browser dies
    SucceedThenDisconnect,
}

#[derive(Default)]
struct FakeNavigator {
    plans: HashMap<String, Plan>,
    holds: HashMap<String, Arc<Semaphore>>,
    received: Arc<Mutex<Vec<(String, FieldValues)>>>,
    started: Option<mpsc::UnboundedSender<String>>,
}

impl FakeNavigator {
    fn plan(mut self, sku: &str, plan: Plan) -> Self {
        self.plans.insert(sku.to_string(), plan);
        self
    }

    /// Keep `sku` in flight until a permit is added to the returned semaphore
    fn hold(&mut self, sku: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.holds.insert(sku.to_string(), Arc::clone(&gate));
        gate
    }

    fn started_channel(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.started = Some(tx);
        rx
    }
}

#[async_trait]
impl SiteNavigator<FakeSession> for FakeNavigator {
    async fn update_product(
        &self,
        session: &mut FakeSession,
        item: &ProductItem,
        fields: &FieldValues,
    ) -> stelshop_browser::Result<ItemOutcome> {
        if let Some(started) = &self.started {
            let _ = started.send(item.sku.clone());
        }
        if let Some(gate) = self.holds.get(&item.sku) {
            let _permit = gate.acquire().await;
        }
        self.received
            .lock()
            .unwrap()
            .push((item.sku.clone(), fields.clone()));

        match self.plans.get(&item.sku).cloned().unwrap_or(Plan::Succeed) {
            Plan::Succeed => Ok(ItemOutcome::Updated {
                fields: vec!["description".to_string()],
            }),
            Plan::Fail(step, kind) => Ok(ItemOutcome::Failed(StepFailure {
                step,
                kind,
                message: format!("{} failed", step),
                screenshot: None,
            })),
            Plan::SucceedThenDisconnect => {
                session.alive.store(false, Ordering::SeqCst);
                Ok(ItemOutcome::Updated {
                    fields: vec!["description".to_string()],
                })
            }
        }
    }
}

struct FailingGenerator;

#[async_trait]
impl FieldGenerator for FailingGenerator {
    async fn generate(&self, _item: &ProductItem) -> stelshop_workflow::Result<FieldValues> {
        Err(Error::Generation("quota exceeded".to_string()))
    }
}

fn item(sku: &str) -> ProductItem {
    ProductItem::new(sku)
        .with_name(format!("Product {}", sku))
        .with_fields(FieldValues {
            description: Some(format!("Description of {}", sku)),
            seo_title: Some(format!("{} - Shop", sku)),
            ..Default::default()
        })
}

fn job(skus: &[&str]) -> ProcessingJob {
    ProcessingJob::new(skus.iter().map(|s| item(s)).collect(), JobSettings::default())
}

fn session(logged_in: bool) -> (SessionSlot<FakeSession>, Arc<AtomicBool>) {
    let alive = Arc::new(AtomicBool::new(true));
    let slot = SessionSlot::new(FakeSession {
        alive: Arc::clone(&alive),
        logged_in,
        script_args: Arc::default(),
        script_delay: Duration::ZERO,
    });
    (slot, alive)
}

fn processor(
    slot: SessionSlot<FakeSession>,
    navigator: FakeNavigator,
) -> BatchProcessor<FakeSession, FakeNavigator> {
    BatchProcessor::new(
        slot,
        navigator,
        Arc::new(TemplateFields::default()),
        ProcessorConfig {
            item_delay: Duration::ZERO,
            ..Default::default()
        },
    )
}

async fn next_event(events: &mut broadcast::Receiver<RunEvent>) -> RunEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collect events up to and including the terminal one
async fn events_until_terminal(events: &mut broadcast::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

async fn wait_for_completed(events: &mut broadcast::Receiver<RunEvent>, sku: &str) {
    loop {
        if let RunEvent::ItemCompleted(record) = next_event(events).await {
            if record.sku == sku {
                return;
            }
        }
    }
}

#[tokio::test]
async fn test_timeout_on_save_is_recorded_and_run_completes() {
    let (slot, _) = session(true);
    let navigator = FakeNavigator::default().plan("B", Plan::Fail(Step::Save, FailureKind::StepTimeout));
    let processor = processor(slot, navigator);
    let mut events = processor.subscribe();

    processor.start(job(&["A", "B", "C"])).await.unwrap();
    let seen = events_until_terminal(&mut events).await;

    assert_eq!(seen.first(), Some(&RunEvent::Started { total: 3 }));
    assert_eq!(
        seen.last(),
        Some(&RunEvent::Completed(RunStatistics {
            processed: 2,
            failed: 1,
            total: 3
        }))
    );

    let status = processor.status();
    assert_eq!(status.state, ProcessingState::Stopped);
    assert_eq!(status.stats, RunStatistics { processed: 2, failed: 1, total: 3 });
    assert_eq!(status.errors.len(), 1);
    assert_eq!(status.errors[0].sku, "B");
    assert_eq!(status.errors[0].step.as_deref(), Some("save"));
    assert!(status.current_item.is_none());
    assert!(status.finished_at.is_some());
}

#[tokio::test]
async fn test_counters_never_exceed_total() {
    let (slot, _) = session(true);
    let navigator = FakeNavigator::default()
        .plan("B", Plan::Fail(Step::Select, FailureKind::NotFound))
        .plan("D", Plan::Fail(Step::Verify, FailureKind::StepTimeout));
    let processor = processor(slot, navigator);
    let reporter = processor.reporter();
    let mut events = processor.subscribe();

    processor.start(job(&["A", "B", "C", "D"])).await.unwrap();

    loop {
        let event = next_event(&mut events).await;
        let stats = reporter.stats();
        assert!(stats.processed + stats.failed <= stats.total);
        if event.is_terminal() {
            assert!(stats.is_complete());
            break;
        }
    }

    let outcomes = reporter.outcomes();
    let skus: Vec<_> = outcomes.iter().map(|o| o.sku.as_str()).collect();
    assert_eq!(skus, vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn test_pause_during_item_holds_next_item_until_resume() {
    let (slot, _) = session(true);
    let mut navigator = FakeNavigator::default();
    let hold_b = navigator.hold("B");
    let mut started = navigator.started_channel();
    let processor = processor(slot, navigator);
    let mut events = processor.subscribe();

    processor.start(job(&["A", "B", "C"])).await.unwrap();

    assert_eq!(started.recv().await.as_deref(), Some("A"));
    assert_eq!(started.recv().await.as_deref(), Some("B"));
    processor.pause().unwrap();
    hold_b.add_permits(1);

    let mut before_b_completed = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let done = matches!(&event, RunEvent::ItemCompleted(record) if record.sku == "B");
        before_b_completed.push(event);
        if done {
            break;
        }
    }
    assert!(before_b_completed.contains(&RunEvent::Paused));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = processor.status();
    assert_eq!(status.state, ProcessingState::Paused);
    assert_eq!(status.stats, RunStatistics { processed: 2, failed: 0, total: 3 });
    assert!(started.try_recv().is_err(), "C started while paused");

    processor.resume().unwrap();
    let seen = events_until_terminal(&mut events).await;

    assert_eq!(seen.first(), Some(&RunEvent::Resumed));
    assert!(matches!(seen.last(), Some(RunEvent::Completed(stats)) if stats.processed == 3));
    assert_eq!(started.recv().await.as_deref(), Some("C"));
}

#[tokio::test]
async fn test_browser_closed_after_first_item_is_fatal() {
    let (slot, alive) = session(true);
    let navigator = FakeNavigator::default().plan("A", Plan::SucceedThenDisconnect);
    let received = Arc::clone(&navigator.received);
    let processor = processor(slot, navigator);
    let mut events = processor.subscribe();

    processor.start(job(&["A", "B", "C"])).await.unwrap();
    let seen = events_until_terminal(&mut events).await;

    assert!(matches!(seen.last(), Some(RunEvent::Fatal { .. })));
    assert!(!seen.iter().any(|e| matches!(
        e,
        RunEvent::ItemStarted { sku, .. } if sku == "B"
    )));
    assert!(!alive.load(Ordering::SeqCst));

    let status = processor.status();
    assert_eq!(status.state, ProcessingState::Stopped);
    assert_eq!(status.stats, RunStatistics { processed: 1, failed: 0, total: 3 });
    assert!(!status.browser_alive);
    assert!(status.fatal_error.is_some());
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(processor.reporter().outcomes().len(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_lets_in_flight_item_finish() {
    let (slot, _) = session(true);
    let mut navigator = FakeNavigator::default();
    let hold_a = navigator.hold("A");
    let mut started = navigator.started_channel();
    let processor = processor(slot, navigator);
    let mut events = processor.subscribe();

    processor.start(job(&["A", "B", "C"])).await.unwrap();
    assert_eq!(started.recv().await.as_deref(), Some("A"));

    processor.stop();
    processor.stop();
    hold_a.add_permits(1);
    processor.wait().await;
    processor.stop();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let terminals: Vec<_> = seen.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(
        terminals,
        vec![&RunEvent::Stopped(RunStatistics {
            processed: 1,
            failed: 0,
            total: 3
        })]
    );
    assert!(started.try_recv().is_err());
    assert_eq!(processor.state(), ProcessingState::Stopped);
}

#[tokio::test]
async fn test_stop_cuts_item_delay_short() {
    let (slot, _) = session(true);
    let processor = BatchProcessor::new(
        slot,
        FakeNavigator::default(),
        Arc::new(TemplateFields::default()),
        ProcessorConfig {
            item_delay: Duration::from_secs(60),
            ..Default::default()
        },
    );
    let mut events = processor.subscribe();

    processor.start(job(&["A", "B"])).await.unwrap();
    wait_for_completed(&mut events, "A").await;
    processor.stop();

    let seen = events_until_terminal(&mut events).await;
    assert!(matches!(seen.last(), Some(RunEvent::Stopped(stats)) if stats.processed == 1));
}

#[tokio::test]
async fn test_start_requires_login() {
    let (slot, _) = session(false);
    let processor = processor(slot, FakeNavigator::default());

    let err = processor.start(job(&["A"])).await.unwrap_err();

    assert!(matches!(err, Error::NotAuthenticated));
    assert_eq!(processor.state(), ProcessingState::Idle);
}

#[tokio::test]
async fn test_custom_login_markers_are_checked() {
    let script_args = Arc::new(Mutex::new(Vec::new()));
    let slot = SessionSlot::new(FakeSession {
        alive: Arc::new(AtomicBool::new(true)),
        logged_in: true,
        script_args: Arc::clone(&script_args),
        script_delay: Duration::ZERO,
    });
    let processor = processor(slot, FakeNavigator::default())
        .with_login_gate(LoginGate::with_markers(vec!["//nav[@id='main-menu']".to_string()]));
    let mut events = processor.subscribe();

    processor.start(job(&["A"])).await.unwrap();
    events_until_terminal(&mut events).await;

    assert_eq!(
        script_args.lock().unwrap().first(),
        Some(&json!(["//nav[@id='main-menu']"]))
    );
}

#[tokio::test]
async fn test_stop_during_login_check_cancels_the_start() {
    let slot = SessionSlot::new(FakeSession {
        alive: Arc::new(AtomicBool::new(true)),
        logged_in: true,
        script_args: Arc::default(),
        script_delay: Duration::from_millis(100),
    });
    let navigator = FakeNavigator::default();
    let received = Arc::clone(&navigator.received);
    let processor = processor(slot.clone(), navigator);
    let mut events = processor.subscribe();

    let (started, ()) = tokio::join!(processor.start(job(&["A", "B", "C"])), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        processor.stop();
    });
    processor.wait().await;

    assert!(matches!(
        started,
        Err(Error::InvalidTransition { action: "start", .. })
    ));
    assert_eq!(processor.state(), ProcessingState::Stopped);
    assert!(received.lock().unwrap().is_empty());
    assert!(slot.try_acquire().is_ok());

    let mut terminals = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, RunEvent::Started { .. }));
        if event.is_terminal() {
            terminals.push(event);
        }
    }
    assert_eq!(terminals.len(), 1);
}

#[tokio::test]
async fn test_start_rejects_invalid_job() {
    let (slot, _) = session(true);
    let processor = processor(slot, FakeNavigator::default());

    let err = processor.start(job(&["A", "A"])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidJob(_)));

    let err = processor.start(job(&[])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidJob(_)));
}

#[tokio::test]
async fn test_busy_session_and_second_job_are_rejected() {
    let (slot, _) = session(true);
    let guard = slot.try_acquire().unwrap();
    let mut navigator = FakeNavigator::default();
    let hold_a = navigator.hold("A");
    let mut started = navigator.started_channel();
    let processor = processor(slot.clone(), navigator);

    let err = processor.start(job(&["A"])).await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy));
    drop(guard);

    processor.start(job(&["A"])).await.unwrap();
    assert_eq!(started.recv().await.as_deref(), Some("A"));

    let err = processor.start(job(&["B"])).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));
    assert!(matches!(slot.try_acquire(), Err(Error::SessionBusy)));

    hold_a.add_permits(1);
    processor.wait().await;
    assert!(slot.try_acquire().is_ok());
}

#[tokio::test]
async fn test_new_job_after_completion_resets_statistics() {
    let (slot, _) = session(true);
    let navigator = FakeNavigator::default().plan("A", Plan::Fail(Step::Search, FailureKind::Script));
    let processor = processor(slot, navigator);

    processor.start(job(&["A", "B"])).await.unwrap();
    processor.wait().await;
    assert_eq!(processor.status().stats, RunStatistics { processed: 1, failed: 1, total: 2 });

    processor.start(job(&["C"])).await.unwrap();
    processor.wait().await;

    let status = processor.status();
    assert_eq!(status.stats, RunStatistics { processed: 1, failed: 0, total: 1 });
    assert!(status.errors.is_empty());
}

#[tokio::test]
async fn test_control_calls_outside_a_run() {
    let (slot, _) = session(true);
    let processor = processor(slot, FakeNavigator::default());
    let mut events = processor.subscribe();

    assert!(matches!(
        processor.pause(),
        Err(Error::InvalidTransition { action: "pause", .. })
    ));
    assert!(processor.resume().is_err());

    processor.stop();
    processor.stop();

    assert!(matches!(next_event(&mut events).await, RunEvent::Stopped(_)));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_generated_fields_merge_and_seo_can_be_dropped() {
    let (slot, _) = session(true);
    let navigator = FakeNavigator::default();
    let received = Arc::clone(&navigator.received);
    let processor = processor(slot, navigator);

    let mut job = job(&["A"]);
    job.items[0].fields.featured = Some(true);
    job.settings = JobSettings {
        use_ai: true,
        update_seo: false,
    };

    processor.start(job).await.unwrap();
    processor.wait().await;

    let received = received.lock().unwrap();
    let (_, fields) = &received[0];
    assert!(fields.detailed_description.is_some());
    assert!(fields.description.as_deref().unwrap().contains("- Product: Product A"));
    assert_eq!(fields.featured, Some(true));
    assert!(!fields.has_seo());
}

#[tokio::test]
async fn test_generator_failure_fails_only_that_item() {
    let (slot, _) = session(true);
    let navigator = FakeNavigator::default();
    let received = Arc::clone(&navigator.received);
    let processor = BatchProcessor::new(
        slot,
        navigator,
        Arc::new(FailingGenerator),
        ProcessorConfig {
            item_delay: Duration::ZERO,
            ..Default::default()
        },
    );

    let mut job = job(&["A", "B"]);
    job.settings.use_ai = true;
    processor.start(job).await.unwrap();
    processor.wait().await;

    let status = processor.status();
    assert_eq!(status.stats, RunStatistics { processed: 0, failed: 2, total: 2 });
    assert_eq!(status.errors[0].step.as_deref(), Some("generate"));
    assert!(status.errors[0].message.contains("quota exceeded"));
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_export_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");
    let (slot, _) = session(true);
    let navigator = FakeNavigator::default().plan("B", Plan::Fail(Step::OpenEditor, FailureKind::StepTimeout));
    let processor = processor(slot, navigator);

    processor.start(job(&["A", "B"])).await.unwrap();
    processor.wait().await;
    processor.export_stats(&path).unwrap();

    let export = stelshop_core::stats::StatsReader::from_file(&path).unwrap();
    assert_eq!(export.state, ProcessingState::Stopped);
    assert_eq!(export.stats, RunStatistics { processed: 1, failed: 1, total: 2 });
    assert!(export.started_at.is_some());
    assert!(export.finished_at.is_some());
    assert_eq!(export.failures().next().unwrap().step.as_deref(), Some("open_editor"));
}
