//! Runtime configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! {
//!   "browser": { "headless": true, "window_size": "1920,1080" },
//!   "timeouts": { "step_timeout_ms": 45000 }
//! }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Location checked when no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "config/stelshop.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserSettings,
    pub site: SiteSettings,
    pub timeouts: Timeouts,
    pub artifacts: ArtifactSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    /// Root directory holding named profiles; `~/.stelshop/profiles` when unset
    pub profiles_dir: Option<PathBuf>,
    pub debugging_port: u16,
    pub window_size: Option<String>,
    pub headless: bool,
    pub disable_images: bool,
    pub user_agent: Option<String>,
    pub page_load_timeout_secs: u64,
    pub navigation_retries: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            profiles_dir: None,
            debugging_port: 9222,
            window_size: Some("1280,720".to_string()),
            headless: false,
            disable_images: false,
            user_agent: None,
            page_load_timeout_secs: 30,
            navigation_retries: 2,
        }
    }
}

impl BrowserSettings {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    /// Resolve the profiles root, falling back to the home directory
    pub fn profiles_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.profiles_dir {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(".stelshop").join("profiles"))
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub base_url: String,
    pub catalog_url: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.stelorder.com/app/".to_string(),
            catalog_url: "https://app.stelorder.com/app/#main_catalogo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Upper bound for any single navigator wait
    pub step_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Pause between two items of a run
    pub item_delay_ms: u64,
    pub login_timeout_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_timeout_ms: 30_000,
            poll_interval_ms: 250,
            item_delay_ms: 2_000,
            login_timeout_secs: 300,
        }
    }
}

impl Timeouts {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub screenshots_dir: PathBuf,
    pub exports_dir: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("screenshots"),
            exports_dir: PathBuf::from("exports"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, else the default location if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    tracing::debug!("No configuration file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("site.base_url", &self.site.base_url),
            ("site.catalog_url", &self.site.catalog_url),
        ] {
            Url::parse(value)
                .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", name, e)))?;
        }

        if self.timeouts.poll_interval_ms == 0 {
            return Err(Error::Config(
                "timeouts.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.poll_interval_ms > self.timeouts.step_timeout_ms {
            return Err(Error::Config(
                "timeouts.poll_interval_ms must not exceed timeouts.step_timeout_ms".to_string(),
            ));
        }

        if let Some(size) = &self.browser.window_size {
            let valid = size
                .split_once(',')
                .is_some_and(|(w, h)| w.trim().parse::<u32>().is_ok() && h.trim().parse::<u32>().is_ok());
            if !valid {
                return Err(Error::Config(format!(
                    "browser.window_size must look like \"1280,720\", got \"{}\"",
                    size
                )));
            }
        }

        Ok(())
    }
}
