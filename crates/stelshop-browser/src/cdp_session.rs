use crate::{Error, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Live DevTools connection: the browser handle, the page under control and
/// the task pumping protocol messages
pub struct CdpConnection {
    pub browser: Browser,
    pub page: Page,
    pub handler_task: JoinHandle<()>,
}

/// Connects to a Chrome instance listening on a remote debugging port
pub struct CdpSession {
    debugging_port: u16,
}

impl CdpSession {
    pub fn new(debugging_port: u16) -> Self {
        Self { debugging_port }
    }

    /// Connect over CDP, retrying while Chrome finishes starting up, and
    /// attach to its first page
    pub async fn connect(&self) -> Result<CdpConnection> {
        let endpoint = format!("http://localhost:{}", self.debugging_port);
        tracing::info!("CDP session: connecting to Chrome on port {}", self.debugging_port);

        let (browser, mut handler) = {
            let mut retries = CONNECT_ATTEMPTS;
            loop {
                tracing::debug!("Attempting CDP connection to {}...", endpoint);
                match Browser::connect(&endpoint).await {
                    Ok(result) => {
                        tracing::info!("CDP connection established");
                        break result;
                    }
                    Err(e) => {
                        retries -= 1;
                        if retries == 0 {
                            return Err(Error::DriverUnavailable(format!(
                                "Failed to connect to Chrome after {} attempts: {}",
                                CONNECT_ATTEMPTS, e
                            )));
                        }
                        tracing::debug!(
                            "CDP connection attempt failed, retrying... ({} left)",
                            retries
                        );
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        };

        // The handler must be polled for any browser command to complete
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler event error (continuing): {}", e);
                }
            }
            tracing::debug!("CDP handler stream ended");
        });

        // Chrome creates its initial page shortly after the endpoint comes up
        tokio::time::sleep(CONNECT_BACKOFF).await;

        let page = match browser.pages().await?.into_iter().next() {
            Some(page) => {
                tracing::debug!("CDP: using existing page");
                page
            }
            None => {
                tracing::debug!("CDP: no existing pages, creating one");
                browser.new_page("about:blank").await?
            }
        };

        Ok(CdpConnection {
            browser,
            page,
            handler_task,
        })
    }

    pub fn debugging_port(&self) -> u16 {
        self.debugging_port
    }
}
