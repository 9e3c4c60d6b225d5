use anyhow::{Result, anyhow, bail};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stelshop_browser::{BrowserSession, ChromeSession, ProfileManager, SessionManager};
use stelshop_core::Config;
use stelshop_core::artifacts;
use stelshop_core::job::{JobReader, ProcessingJob};
use stelshop_workflow::{
    BatchProcessor, LoginGate, NavigatorConfig, ProcessorConfig, RunEvent, RunStatus,
    SessionSlot, StelNavigator, TemplateFields,
};
use tokio::sync::{broadcast, mpsc};

const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct RunOptions {
    pub job: PathBuf,
    pub profile: String,
    pub temp: bool,
    pub export: Option<PathBuf>,
    pub interactive: bool,
}

enum Control {
    Pause,
    Resume,
    Stop,
}

pub fn execute(config: &Config, options: RunOptions) -> Result<()> {
    let job = JobReader::from_file(&options.job)?;
    let report = JobReader::check(&job);
    for warning in &report.warnings {
        println!("{} {}", style("warning:").yellow(), warning);
    }
    if let Some(first) = report.errors.first() {
        bail!("Invalid job {}: {}", options.job.display(), first);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        println!("Starting Chrome...");
        let manager = SessionManager::new(config.browser.clone());
        let mut session = if options.temp {
            println!("Using a temporary profile");
            manager
                .start_with_profile(ProfileManager::temporary()?)
                .await?
        } else {
            println!("Using profile '{}'", options.profile);
            manager.start(&options.profile).await?
        };

        let navigator = StelNavigator::new(NavigatorConfig::from_config(config));
        navigator.navigate_to_login(&mut session).await?;

        if let Err(e) = wait_for_login(&mut session, config.timeouts.login_timeout()).await {
            let _ = session.close().await;
            return Err(e);
        }

        let slot = SessionSlot::new(session);
        let processor = BatchProcessor::new(
            slot.clone(),
            navigator,
            Arc::new(TemplateFields::default()),
            ProcessorConfig {
                item_delay: config.timeouts.item_delay(),
                ..Default::default()
            },
        );

        let result = drive(&processor, job, options.interactive).await;
        processor.wait().await;

        let status = processor.status();
        let exported = match status.started_at {
            Some(_) => {
                let path = options.export.clone().unwrap_or_else(|| {
                    artifacts::stats_export_path(&config.artifacts.exports_dir, chrono::Utc::now())
                });
                processor.export_stats(&path).map(|()| Some(path))
            }
            None => Ok(None),
        };

        slot.acquire().await.close().await?;

        let exported = exported?;
        if status.started_at.is_some() {
            print_summary(&status, exported.as_deref());
        }
        result
    })
}

/// Poll the login markers until the operator has signed in
async fn wait_for_login(session: &mut ChromeSession, timeout: Duration) -> Result<()> {
    let gate = LoginGate::new();
    let started = Instant::now();
    let mut announced = false;

    loop {
        if gate.check_logged_in(session).await? {
            println!("{}", style("Logged in to Stelorder").green());
            return Ok(());
        }
        if started.elapsed() >= timeout {
            bail!("Not logged in after {}s", timeout.as_secs());
        }
        if !announced {
            println!("Log in to Stelorder in the browser window; waiting up to {}s...", timeout.as_secs());
            announced = true;
        }
        tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
    }
}

/// Read p/r/s keys on a detached thread so a pending read never blocks exit
fn spawn_key_reader() -> mpsc::UnboundedReceiver<Control> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let term = Term::stdout();
        while let Ok(key) = term.read_char() {
            let control = match key.to_ascii_lowercase() {
                'p' => Control::Pause,
                'r' => Control::Resume,
                's' => Control::Stop,
                _ => continue,
            };
            if tx.send(control).is_err() {
                break;
            }
        }
    });
    rx
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(progress_style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
    {
        bar.set_style(progress_style);
    }
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

async fn drive(
    processor: &BatchProcessor<ChromeSession, StelNavigator>,
    job: ProcessingJob,
    interactive: bool,
) -> Result<()> {
    let mut events = processor.subscribe();
    let total = job.len();
    processor.start(job).await?;

    let mut keys = if interactive && Term::stdout().is_term() {
        println!("Keys: p) pause  r) resume  s) stop");
        Some(spawn_key_reader())
    } else {
        None
    };
    let bar = progress_bar(total);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    show_event(&bar, &event);
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Progress display skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(control) = next_key(&mut keys) => {
                let result = match control {
                    Control::Pause => processor.pause(),
                    Control::Resume => processor.resume(),
                    Control::Stop => {
                        processor.stop();
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    bar.println(format!("{}", style(e).yellow()));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                bar.println("Interrupted, stopping after the current item...");
                processor.stop();
            }
        }
    }

    bar.finish_and_clear();
    match processor.status().fatal_error {
        Some(message) => Err(anyhow!("Run aborted: {}", message)),
        None => Ok(()),
    }
}

async fn next_key(keys: &mut Option<mpsc::UnboundedReceiver<Control>>) -> Option<Control> {
    match keys {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn show_event(bar: &ProgressBar, event: &RunEvent) {
    match event {
        RunEvent::Started { total } => bar.set_length(*total as u64),
        RunEvent::ItemStarted { sku, .. } => bar.set_message(sku.clone()),
        RunEvent::ItemCompleted(record) => {
            bar.inc(1);
            if record.success {
                bar.println(format!("{} {}", style("ok  ").green(), record.sku));
            } else {
                bar.println(format!(
                    "{} {} [{}] {}",
                    style("FAIL").red(),
                    record.sku,
                    record.step.as_deref().unwrap_or("-"),
                    record.message
                ));
            }
        }
        RunEvent::Paused => bar.set_message("paused (r to resume)"),
        RunEvent::Resumed => bar.set_message("resumed"),
        RunEvent::Completed(_) | RunEvent::Stopped(_) => bar.set_message("done"),
        RunEvent::Fatal { message } => {
            bar.println(format!("{} {}", style("fatal:").red().bold(), message))
        }
    }
}

fn print_summary(status: &RunStatus, export_path: Option<&Path>) {
    println!();
    println!("{}", style("Run finished").bold());
    println!("  Processed: {}", style(status.stats.processed).green());
    println!("  Failed:    {}", style(status.stats.failed).red());
    println!("  Skipped:   {}", status.stats.remaining());
    if let Some(path) = export_path {
        println!("  Stats:     {}", path.display());
    }
}
