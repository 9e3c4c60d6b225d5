use crate::{Error, Result};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use stelshop_core::config::BrowserSettings;

/// Switches every session gets. Background throttling is off so a minimized
/// window keeps running page scripts while a job is in progress.
const BASE_FLAGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-background-networking",
];

/// Spawns the Chrome process for a session on a given profile
pub struct ChromeLauncher {
    chrome_path: PathBuf,
    profile_path: PathBuf,
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(chrome_path: PathBuf, profile_path: PathBuf, settings: &BrowserSettings) -> Self {
        Self {
            chrome_path,
            profile_path,
            settings: settings.clone(),
        }
    }

    pub fn launch(&self) -> Result<Child> {
        let args = self.build_args();
        tracing::debug!("Launching {} {}", self.chrome_path.display(), args.join(" "));

        Command::new(&self.chrome_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::DriverUnavailable(format!("Failed to launch Chrome: {}", e)))
    }

    fn build_args(&self) -> Vec<String> {
        let settings = &self.settings;
        let mut args = vec![
            format!("--remote-debugging-port={}", settings.debugging_port),
            format!("--user-data-dir={}", self.profile_path.display()),
        ];
        args.extend(BASE_FLAGS.iter().map(|flag| flag.to_string()));

        if settings.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(size) = &settings.window_size {
            args.push(format!("--window-size={}", size.replace(' ', "")));
        }
        if settings.disable_images {
            args.push("--blink-settings=imagesEnabled=false".to_string());
        }
        if let Some(agent) = &settings.user_agent {
            args.push(format!("--user-agent={}", agent));
        }

        // The navigator opens the site itself once CDP is attached
        args.push("about:blank".to_string());
        args
    }

    pub fn debugging_port(&self) -> u16 {
        self.settings.debugging_port
    }
}
