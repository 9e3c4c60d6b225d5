use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Executable names tried on `PATH` once the install locations are exhausted
const PATH_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "linux")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(target_os = "windows")]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const INSTALL_LOCATIONS: &[&str] = &[];

/// Resolves the Chrome executable a session is launched with.
///
/// An explicit path (config `browser.chrome_path` or `--chrome-path`) is
/// authoritative: when it is unusable the lookup fails instead of falling
/// back to another browser.
pub struct ChromeFinder {
    custom_path: Option<PathBuf>,
}

impl ChromeFinder {
    pub fn new(custom_path: Option<PathBuf>) -> Self {
        Self { custom_path }
    }

    pub fn find(&self) -> Result<PathBuf> {
        if let Some(path) = &self.custom_path {
            return check_executable(path).map(|()| path.clone());
        }

        let installed = INSTALL_LOCATIONS
            .iter()
            .map(Path::new)
            .find(|path| check_executable(path).is_ok());
        if let Some(path) = installed {
            tracing::debug!("Chrome found at {}", path.display());
            return Ok(path.to_path_buf());
        }

        if let Some(path) = PATH_NAMES.iter().find_map(|name| which::which(name).ok()) {
            tracing::debug!("Chrome found on PATH at {}", path.display());
            return Ok(path);
        }

        Err(Error::DriverUnavailable(format!(
            "Chrome not found in {} or on PATH ({}). Set browser.chrome_path or pass --chrome-path.",
            INSTALL_LOCATIONS.join(", "),
            PATH_NAMES.join(", ")
        )))
    }
}

fn check_executable(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|_| {
        Error::DriverUnavailable(format!("Chrome not found at: {}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(Error::DriverUnavailable(format!(
            "Chrome path is not a file: {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Error::DriverUnavailable(format!(
                "Chrome binary not executable: {}",
                path.display()
            )));
        }
    }

    Ok(())
}
