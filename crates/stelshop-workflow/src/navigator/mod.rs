//! Stelorder catalog UI operations.
//!
//! [`StelNavigator::update_product`] runs one product through the ordered
//! steps below. Every step polls a page script until it reports success or the
//! step timeout elapses.
//!
//! | step          | action                                              |
//! |---------------|-----------------------------------------------------|
//! | `catalog`     | open the catalog list and wait for its search box   |
//! | `search`      | type the SKU into the search box                    |
//! | `select`      | open the single row whose cell equals the SKU       |
//! | `shop_tab`    | switch to the product's Shop tab                    |
//! | `open_editor` | open the shop edit dialog                           |
//! | `write_fields`| fill description, SEO, featured and rich text       |
//! | `save`        | press the dialog's save button                      |
//! | `verify`      | wait for the dialog to close                        |

mod scripts;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use stelshop_browser::BrowserSession;
use stelshop_core::Config;
use stelshop_core::artifacts;
use stelshop_core::job::{FieldValues, ProductItem};

/// Upper bound for waiting on search results before a SKU counts as missing
const RESULTS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Catalog,
    Search,
    Select,
    ShopTab,
    OpenEditor,
    WriteFields,
    Save,
    Verify,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Catalog => "catalog",
            Step::Search => "search",
            Step::Select => "select",
            Step::ShopTab => "shop_tab",
            Step::OpenEditor => "open_editor",
            Step::WriteFields => "write_fields",
            Step::Save => "save",
            Step::Verify => "verify",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StepTimeout,
    NotFound,
    AmbiguousMatch,
    Script,
}

/// Why a product could not be updated
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: Step,
    pub kind: FailureKind,
    pub message: String,
    pub screenshot: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Names of the fields written
    Updated { fields: Vec<String> },
    Failed(StepFailure),
}

/// Product update as seen by the batch processor.
///
/// Per-product problems come back as [`ItemOutcome::Failed`]; `Err` is
/// reserved for errors that end the browser session.
#[async_trait]
pub trait SiteNavigator<S: BrowserSession>: Send + Sync {
    async fn update_product(
        &self,
        session: &mut S,
        item: &ProductItem,
        fields: &FieldValues,
    ) -> stelshop_browser::Result<ItemOutcome>;
}

#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub base_url: String,
    pub catalog_url: String,
    pub step_timeout: Duration,
    pub poll_interval: Duration,
    pub screenshots_dir: PathBuf,
}

impl NavigatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.site.base_url.clone(),
            catalog_url: config.site.catalog_url.clone(),
            step_timeout: config.timeouts.step_timeout(),
            poll_interval: config.timeouts.poll_interval(),
            screenshots_dir: config.artifacts.screenshots_dir.clone(),
        }
    }
}

/// Internal step result: either the session is gone or this step failed
enum Interrupt {
    Fatal(stelshop_browser::Error),
    Failed(FailureKind, String),
}

impl From<stelshop_browser::Error> for Interrupt {
    fn from(err: stelshop_browser::Error) -> Self {
        if err.is_fatal() {
            Interrupt::Fatal(err)
        } else {
            Interrupt::Failed(FailureKind::Script, err.to_string())
        }
    }
}

fn at(step: Step) -> impl FnOnce(Interrupt) -> (Step, Interrupt) {
    move |interrupt| (step, interrupt)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Field list handed to the write script, in dialog order
fn field_entries(fields: &FieldValues) -> Vec<Value> {
    let mut entries = Vec::new();
    let mut text = |name: &str, id: &str, value: &Option<String>| {
        if let Some(value) = value {
            entries.push(json!({ "name": name, "id": id, "kind": "text", "value": value }));
        }
    };
    text("description", "descriptionShop", &fields.description);
    text("seo_title", "seoTitleShop", &fields.seo_title);
    text("seo_description", "seoDescriptionShop", &fields.seo_description);

    if let Some(featured) = fields.featured {
        entries.push(json!({
            "name": "featured",
            "id": "destacadoShop",
            "kind": "checkbox",
            "value": featured,
        }));
    }
    if let Some(html) = &fields.detailed_description {
        entries.push(json!({
            "name": "detailed_description",
            "id": "cke_wysiwyg_frame",
            "kind": "rich_text",
            "value": html,
        }));
    }
    entries
}

/// Drives the Stelorder catalog through page scripts
pub struct StelNavigator {
    config: NavigatorConfig,
}

impl StelNavigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Open the login page so the operator can sign in
    pub async fn navigate_to_login<S: BrowserSession>(
        &self,
        session: &mut S,
    ) -> stelshop_browser::Result<()> {
        tracing::info!("Opening {}", self.config.base_url);
        session.navigate(&self.config.base_url).await
    }

    /// Run `script` until it returns a truthy value or `timeout` elapses.
    ///
    /// Non-fatal script errors are retried. Running out of time is always a
    /// `StepTimeout`; the last script error, if any, is kept in the message.
    async fn poll<S: BrowserSession>(
        &self,
        session: &mut S,
        script: &str,
        args: &[Value],
        timeout: Duration,
    ) -> Result<Value, Interrupt> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_error = None;

        loop {
            match session.execute_script(script, args).await {
                Ok(value) if truthy(&value) => return Ok(value),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(Interrupt::Fatal(e)),
                Err(e) => last_error = Some(e.to_string()),
            }

            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                let mut message = format!("Timed out after {:?}", timeout);
                if let Some(error) = last_error {
                    message.push_str(&format!(" (last error: {})", error));
                }
                return Err(Interrupt::Failed(FailureKind::StepTimeout, message));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn click_first<S: BrowserSession>(
        &self,
        session: &mut S,
        xpaths: &[&str],
    ) -> Result<(), Interrupt> {
        let args = [json!(xpaths)];
        let used = self
            .poll(session, scripts::CLICK_FIRST, &args, self.config.step_timeout)
            .await?;
        tracing::debug!("Clicked {}", used);
        Ok(())
    }

    async fn open_catalog<S: BrowserSession>(&self, session: &mut S) -> Result<(), Interrupt> {
        session.navigate(&self.config.catalog_url).await?;
        if !truthy(&session.execute_script(scripts::CLICK_CATALOG_TAB, &[]).await?) {
            tracing::debug!("Catalog tab not present, assuming catalog is open");
        }
        self.poll(session, scripts::SEARCH_BOX_READY, &[], self.config.step_timeout)
            .await?;
        Ok(())
    }

    async fn search<S: BrowserSession>(&self, session: &mut S, sku: &str) -> Result<(), Interrupt> {
        let args = [json!(sku)];
        self.poll(session, scripts::TYPE_SEARCH, &args, self.config.step_timeout)
            .await?;
        Ok(())
    }

    async fn select<S: BrowserSession>(&self, session: &mut S, sku: &str) -> Result<(), Interrupt> {
        let args = [json!(sku)];
        let timeout = self.config.step_timeout.min(RESULTS_TIMEOUT);
        let matches = match self.poll(session, scripts::COUNT_MATCHES, &args, timeout).await {
            Ok(count) => count.as_u64().unwrap_or(0),
            // No row showed up before the deadline
            Err(Interrupt::Failed(..)) => {
                return Err(Interrupt::Failed(
                    FailureKind::NotFound,
                    format!("No catalog row matches SKU '{}'", sku),
                ));
            }
            Err(fatal) => return Err(fatal),
        };

        if matches > 1 {
            return Err(Interrupt::Failed(
                FailureKind::AmbiguousMatch,
                format!("{} catalog rows match SKU '{}'", matches, sku),
            ));
        }

        if !truthy(&session.execute_script(scripts::CLICK_MATCH, &args).await?) {
            return Err(Interrupt::Failed(
                FailureKind::NotFound,
                format!("Row for SKU '{}' disappeared before it could be opened", sku),
            ));
        }
        Ok(())
    }

    async fn open_editor<S: BrowserSession>(&self, session: &mut S) -> Result<(), Interrupt> {
        self.click_first(session, scripts::EDIT_SHOP_XPATHS).await?;
        let args = [json!(scripts::DIALOG_ID)];
        self.poll(session, scripts::ELEMENT_VISIBLE, &args, self.config.step_timeout)
            .await?;
        Ok(())
    }

    async fn write_fields<S: BrowserSession>(
        &self,
        session: &mut S,
        fields: &FieldValues,
    ) -> Result<Vec<String>, Interrupt> {
        let args = [
            json!(scripts::DIALOG_ID),
            Value::Array(field_entries(fields)),
            json!(fields.has_seo()),
        ];
        let result = self
            .poll(session, scripts::WRITE_FIELDS, &args, self.config.step_timeout)
            .await?;

        let names = |key: &str| -> Vec<String> {
            result[key]
                .as_array()
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|n| n.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let missing = names("missing");
        if !missing.is_empty() {
            return Err(Interrupt::Failed(
                FailureKind::NotFound,
                format!("Fields not found in editor: {}", missing.join(", ")),
            ));
        }
        Ok(names("written"))
    }

    async fn save<S: BrowserSession>(&self, session: &mut S) -> Result<(), Interrupt> {
        self.click_first(session, scripts::SAVE_XPATHS).await
    }

    async fn verify<S: BrowserSession>(&self, session: &mut S) -> Result<(), Interrupt> {
        let args = [json!(scripts::DIALOG_ID)];
        self.poll(session, scripts::ELEMENT_HIDDEN, &args, self.config.step_timeout)
            .await?;
        Ok(())
    }

    async fn run_steps<S: BrowserSession>(
        &self,
        session: &mut S,
        sku: &str,
        fields: &FieldValues,
    ) -> Result<Vec<String>, (Step, Interrupt)> {
        self.open_catalog(session).await.map_err(at(Step::Catalog))?;
        self.search(session, sku).await.map_err(at(Step::Search))?;
        self.select(session, sku).await.map_err(at(Step::Select))?;
        self.click_first(session, scripts::SHOP_TAB_XPATHS)
            .await
            .map_err(at(Step::ShopTab))?;
        self.open_editor(session).await.map_err(at(Step::OpenEditor))?;
        let written = self
            .write_fields(session, fields)
            .await
            .map_err(at(Step::WriteFields))?;
        self.save(session).await.map_err(at(Step::Save))?;
        self.verify(session).await.map_err(at(Step::Verify))?;
        Ok(written)
    }

    /// Save a screenshot of the failed page; failures here are only logged
    async fn capture_failure<S: BrowserSession>(
        &self,
        session: &mut S,
        sku: &str,
    ) -> Option<PathBuf> {
        let png = match session.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("Could not capture screenshot for {}: {}", sku, e);
                return None;
            }
        };

        let path = artifacts::screenshot_path(&self.config.screenshots_dir, sku, chrono::Utc::now());
        if let Err(e) = tokio::fs::create_dir_all(&self.config.screenshots_dir).await {
            tracing::warn!(
                "Could not create {}: {}",
                self.config.screenshots_dir.display(),
                e
            );
            return None;
        }
        match tokio::fs::write(&path, png).await {
            Ok(()) => {
                tracing::info!("Screenshot saved: {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Could not write {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl<S: BrowserSession> SiteNavigator<S> for StelNavigator {
    async fn update_product(
        &self,
        session: &mut S,
        item: &ProductItem,
        fields: &FieldValues,
    ) -> stelshop_browser::Result<ItemOutcome> {
        tracing::info!("Updating product {}", item.sku);

        match self.run_steps(session, &item.sku, fields).await {
            Ok(fields) => {
                tracing::info!("Product {} saved ({})", item.sku, fields.join(", "));
                Ok(ItemOutcome::Updated { fields })
            }
            Err((step, Interrupt::Fatal(e))) => {
                tracing::error!("Session lost during {} of {}: {}", step, item.sku, e);
                Err(e)
            }
            Err((step, Interrupt::Failed(kind, message))) => {
                tracing::warn!("Product {} failed at {}: {}", item.sku, step, message);
                let screenshot = self.capture_failure(session, &item.sku).await;
                Ok(ItemOutcome::Failed(StepFailure {
                    step,
                    kind,
                    message,
                    screenshot,
                }))
            }
        }
    }
}
