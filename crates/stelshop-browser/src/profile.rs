use crate::{Error, Result};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Files Chrome keeps in the profile root while it owns the profile
const SINGLETON_LOCKS: &[&str] = &["SingletonLock", "lockfile"];
const SINGLETON_EXTRAS: &[&str] = &["SingletonSocket", "SingletonCookie"];

/// Session state wiped before each launch so a run starts logged out and
/// without stale caches
const SESSION_DATA: &[&str] = &[
    "Default/Cookies",
    "Default/Cookies-journal",
    "Default/Local Storage",
    "Default/Session Storage",
    "Default/IndexedDB",
    "Default/Cache",
    "Default/Code Cache",
    "Default/GPUCache",
    "Default/Service Worker",
    "Default/Web Data",
    "Default/Web Data-journal",
    "Default/History",
    "Default/History-journal",
    "Default/Login Data",
    "Default/Login Data-journal",
    "Default/Network",
    "Default/blob_storage",
    "Default/databases",
    "Default/File System",
    "Default/Platform Notifications",
    "ShaderCache",
    "GrShaderCache",
];

/// Summary of a profile directory
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub locked: bool,
}

/// Manages Chrome profile directories
pub struct ProfileManager {
    path: PathBuf,
    is_temporary: bool,
}

impl ProfileManager {
    /// Create a temporary profile that will be deleted on drop
    pub fn temporary() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.keep();

        Ok(Self {
            path,
            is_temporary: true,
        })
    }

    /// Create or use a persistent profile at the given path
    pub fn persistent(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }

        Ok(Self {
            path,
            is_temporary: false,
        })
    }

    /// Create or use the persistent profile `name` under `root`
    pub fn named(root: &Path, name: &str) -> Result<Self> {
        Self::validate_name(name)?;
        Self::persistent(root.join(name))
    }

    /// Reject names that would escape the profiles root
    pub fn validate_name(name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return Err(Error::Browser(format!("Invalid profile name: '{}'", name)));
        }
        Ok(())
    }

    /// List profiles found under `root`, sorted by name
    pub fn list(root: &Path) -> Result<Vec<ProfileInfo>> {
        let mut profiles = Vec::new();
        if !root.exists() {
            return Ok(profiles);
        }

        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let profile = Self::persistent(path.clone())?;
            profiles.push(ProfileInfo {
                name,
                size: profile.size().unwrap_or(0),
                locked: profile.is_locked(),
                path,
            });
        }

        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    /// True when a Chrome process currently holds this profile.
    ///
    /// A lock whose owner is gone (crashed Chrome, killed stelshop) does not
    /// count; `clean_session_data` removes it.
    pub fn is_locked(&self) -> bool {
        let present = SINGLETON_LOCKS
            .iter()
            .any(|name| std::fs::symlink_metadata(self.path.join(name)).is_ok());
        present && !self.lock_is_stale()
    }

    /// Host and pid recorded by Chrome as the `SingletonLock` symlink target
    fn lock_owner(&self) -> Option<(String, u32)> {
        let target = std::fs::read_link(self.path.join("SingletonLock")).ok()?;
        let (host, pid) = target.to_str()?.rsplit_once('-')?;
        Some((host.to_string(), pid.parse().ok()?))
    }

    /// Held only by a live process on this host. A lock without a readable
    /// owner is treated as held.
    fn lock_is_stale(&self) -> bool {
        let Some((host, pid)) = self.lock_owner() else {
            return false;
        };
        match System::host_name() {
            Some(local) if local != host => true,
            _ => !process_running(pid),
        }
    }

    /// Remove a lock left behind by a Chrome that is no longer running
    pub fn release_stale_lock(&self) -> bool {
        if !self.lock_is_stale() {
            return false;
        }
        tracing::info!("Removing stale Chrome lock from {}", self.path.display());
        self.release_lock();
        true
    }

    /// Remove Chrome's singleton files. Only valid once our own Chrome has exited.
    pub fn release_lock(&self) {
        for name in SINGLETON_LOCKS.iter().chain(SINGLETON_EXTRAS) {
            let path = self.path.join(name);
            if std::fs::symlink_metadata(&path).is_ok() {
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::debug!("Released {}", path.display()),
                    Err(e) => tracing::warn!("Could not release {}: {}", path.display(), e),
                }
            }
        }
    }

    /// Remove cookies, storage, caches and history. Returns how many entries were removed.
    pub fn clean_session_data(&self) -> Result<usize> {
        self.release_stale_lock();
        if self.is_locked() {
            return Err(Error::ProfileLocked(self.path.clone()));
        }

        let mut removed = 0;
        for item in SESSION_DATA {
            let item_path = self.path.join(item);
            let result = if item_path.is_dir() {
                std::fs::remove_dir_all(&item_path)
            } else if item_path.is_file() {
                std::fs::remove_file(&item_path)
            } else {
                continue;
            };

            match result {
                Ok(()) => {
                    tracing::debug!("Removed profile data: {}", item);
                    removed += 1;
                }
                Err(e) => tracing::warn!("Could not remove {}: {}", item_path.display(), e),
            }
        }

        tracing::info!(
            "Cleaned {} item(s) from profile {}",
            removed,
            self.path.display()
        );
        Ok(removed)
    }

    /// Total size of the profile directory in bytes
    pub fn size(&self) -> Result<u64> {
        fn dir_size(path: &Path) -> std::io::Result<u64> {
            let mut total = 0;
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let metadata = entry.metadata()?;
                if metadata.is_dir() {
                    total += dir_size(&entry.path())?;
                } else {
                    total += metadata.len();
                }
            }
            Ok(total)
        }

        Ok(dir_size(&self.path)?)
    }
}

impl Drop for ProfileManager {
    fn drop(&mut self) {
        if self.is_temporary && self.path.exists() {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

fn process_running(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}
