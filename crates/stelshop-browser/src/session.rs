use crate::{CdpSession, ChromeFinder, ChromeLauncher, Error, ProfileManager, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::{Page, ScreenshotParams};
use serde::Serialize;
use stelshop_core::config::BrowserSettings;
use std::process::Child;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a browser session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Active,
    Closed,
}

/// Operations the workflow needs from a browser.
///
/// Errors for which [`Error::is_fatal`] holds mean the session is gone; any
/// other error concerns only the command that raised it.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` in the controlled page
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Capture the visible page as PNG
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Run `script` as a function body; `args` are visible as `arguments`
    async fn execute_script(
        &mut self,
        script: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value>;

    async fn current_url(&mut self) -> Result<Option<String>>;

    /// Probe the browser; a dead browser moves the session to `Closed`
    async fn is_alive(&mut self) -> bool;

    /// Shut the browser down and release the profile. Idempotent.
    async fn close(&mut self) -> Result<()>;

    fn state(&self) -> SessionState;

    fn uptime(&self) -> Option<Duration>;
}

/// Wrap a function body so it runs with `args` bound to `arguments`
pub(crate) fn wrap_script(script: &str, args: &[serde_json::Value]) -> String {
    let args = serde_json::Value::Array(args.to_vec());
    format!("(function() {{\n{}\n}}).apply(null, {})", script, args)
}

/// A Chrome instance launched by [`SessionManager`] and driven over CDP
pub struct ChromeSession {
    state: SessionState,
    started_at: Instant,
    child: Option<Child>,
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    profile: ProfileManager,
    page_load_timeout: Duration,
    navigation_retries: u32,
}

impl ChromeSession {
    pub fn profile(&self) -> &ProfileManager {
        &self.profile
    }

    fn page(&self) -> Result<Page> {
        match self.state {
            SessionState::Active => self.page.clone().ok_or(Error::SessionClosed),
            _ => Err(Error::SessionClosed),
        }
    }

    /// Record a command error; fatal errors close the session
    fn observe(&mut self, err: Error) -> Error {
        if err.is_fatal() && self.state == SessionState::Active {
            tracing::error!("Browser session lost: {}", err);
            self.state = SessionState::Closed;
        }
        err
    }

    fn process_exited(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(Some(status))) => {
                tracing::warn!("Chrome exited (status: {})", status);
                true
            }
            Some(Err(e)) => {
                tracing::warn!("Could not query Chrome process: {}", e);
                true
            }
            _ => false,
        }
    }

    async fn terminate_process(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                _ => {
                    tracing::debug!("Chrome did not exit in time, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
            }
        }

        // A killed Chrome leaves its singleton lock behind
        self.profile.release_lock();
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        let attempts = self.navigation_retries + 1;

        for attempt in 1..=attempts {
            tracing::debug!("Navigating to {} (attempt {}/{})", url, attempt, attempts);
            match tokio::time::timeout(self.page_load_timeout, page.goto(url)).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => {
                    let err = self.observe(Error::from(e));
                    if err.is_fatal() {
                        return Err(err);
                    }
                    tracing::warn!("Navigation to {} failed: {}", url, err);
                }
                Err(_) => tracing::warn!(
                    "Navigation to {} timed out after {:?}",
                    url,
                    self.page_load_timeout
                ),
            }
        }

        let err = Error::NavigationTimeout {
            url: url.to_string(),
            attempts,
        };
        tracing::error!("{}", err);
        let _ = self.close().await;
        Err(err)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let page = self.page()?;
        page.screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| self.observe(Error::from(e)))
    }

    async fn execute_script(
        &mut self,
        script: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value> {
        let page = self.page()?;
        let expression = wrap_script(script, args);

        let result = page
            .evaluate(expression)
            .await
            .map_err(|e| self.observe(Error::from(e)))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        let page = self.page()?;
        page.url().await.map_err(|e| self.observe(Error::from(e)))
    }

    async fn is_alive(&mut self) -> bool {
        if self.state != SessionState::Active {
            return false;
        }

        let handler_done = self
            .handler_task
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if handler_done || self.process_exited() {
            self.state = SessionState::Closed;
            return false;
        }

        let Ok(page) = self.page() else {
            return false;
        };
        match tokio::time::timeout(LIVENESS_TIMEOUT, page.evaluate("1")).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => !self.observe(Error::from(e)).is_fatal(),
            // Busy page, not a dead browser
            Err(_) => true,
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed && self.child.is_none() {
            return Ok(());
        }
        tracing::info!("Closing browser session");
        self.state = SessionState::Closed;
        self.page = None;

        if let Some(mut browser) = self.browser.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, browser.close()).await {
                Ok(Ok(_)) => tracing::debug!("Browser acknowledged close"),
                Ok(Err(e)) => tracing::debug!("Browser close failed: {}", e),
                Err(_) => tracing::debug!("Browser close timed out"),
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        self.terminate_process().await;

        Ok(())
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn uptime(&self) -> Option<Duration> {
        match self.state {
            SessionState::Active => Some(self.started_at.elapsed()),
            _ => None,
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        if let Some(mut child) = self.child.take() {
            tracing::debug!("Dropping active browser session, killing Chrome");
            let _ = child.kill();
            let _ = child.wait();
            self.profile.release_lock();
        }
    }
}

/// Launches browser sessions on persistent profiles
pub struct SessionManager {
    settings: BrowserSettings,
}

impl SessionManager {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    /// Start a session on the named profile under the configured profiles root
    pub async fn start(&self, profile_name: &str) -> Result<ChromeSession> {
        let root = self
            .settings
            .profiles_root()
            .map_err(|e| Error::Browser(e.to_string()))?;
        let profile = ProfileManager::named(&root, profile_name)?;
        self.start_with_profile(profile).await
    }

    /// Start a session on an already prepared profile
    pub async fn start_with_profile(&self, profile: ProfileManager) -> Result<ChromeSession> {
        let chrome_binary = ChromeFinder::new(self.settings.chrome_path.clone()).find()?;
        tracing::info!("Using Chrome at: {}", chrome_binary.display());

        if profile.is_locked() {
            return Err(Error::ProfileLocked(profile.path().to_path_buf()));
        }
        profile.clean_session_data()?;

        let launcher =
            ChromeLauncher::new(chrome_binary, profile.path().to_path_buf(), &self.settings);
        let mut child = launcher.launch()?;
        tracing::info!("Chrome started (pid {})", child.id());

        let connection = match CdpSession::new(launcher.debugging_port()).connect().await {
            Ok(connection) => connection,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                profile.release_lock();
                return Err(e);
            }
        };

        Ok(ChromeSession {
            state: SessionState::Active,
            started_at: Instant::now(),
            child: Some(child),
            browser: Some(connection.browser),
            page: Some(connection.page),
            handler_task: Some(connection.handler_task),
            profile,
            page_load_timeout: self.settings.page_load_timeout(),
            navigation_retries: self.settings.navigation_retries,
        })
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.settings
    }
}
