//! In-memory [`BrowserSession`] for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use stelshop_browser::{BrowserSession, Result, SessionState};

/// Answers every script through a closure and records navigations
pub struct ScriptedSession<F> {
    respond: F,
    pub navigations: Vec<String>,
    pub scripts_run: usize,
}

impl<F> ScriptedSession<F>
where
    F: Fn(&str, &[Value]) -> Result<Value> + Send,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            navigations: Vec::new(),
            scripts_run: 0,
        }
    }
}

#[async_trait]
impl<F> BrowserSession for ScriptedSession<F>
where
    F: Fn(&str, &[Value]) -> Result<Value> + Send,
{
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn execute_script(&mut self, script: &str, args: &[Value]) -> Result<Value> {
        self.scripts_run += 1;
        (self.respond)(script, args)
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        Ok(self.navigations.last().cloned())
    }

    async fn is_alive(&mut self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> SessionState {
        SessionState::Active
    }

    fn uptime(&self) -> Option<Duration> {
        Some(Duration::from_secs(1))
    }
}
