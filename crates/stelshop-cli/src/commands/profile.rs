//! Chrome profile management.
//!
//! Profiles live under the configured profiles root (default
//! `~/.stelshop/profiles`). Session data is cleared before every launch, so
//! a profile keeps extensions and preferences but not the Stelorder login.
//!
//! ```bash
//! stelshop profile list
//! stelshop profile clean stel
//! stelshop profile delete old --force
//! ```

use anyhow::{Result, anyhow};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use stelshop_browser::ProfileManager;
use stelshop_core::Config;

const SIZE_WARNING_THRESHOLD: u64 = 1_073_741_824; // 1GB

fn profile_path(root: &Path, name: &str) -> Result<std::path::PathBuf> {
    ProfileManager::validate_name(name)?;
    let path = root.join(name);
    if !path.is_dir() {
        return Err(anyhow!("Profile '{}' not found", name));
    }
    Ok(path)
}

/// List all profiles under the profiles root
pub fn list(config: &Config) -> Result<()> {
    let root = config.browser.profiles_root()?;
    let profiles = ProfileManager::list(&root)?;

    if profiles.is_empty() {
        println!(
            "No profiles found. Profiles will be created in: {}",
            root.display()
        );
        return Ok(());
    }

    println!("Available profiles:");
    println!();

    let mut has_warnings = false;
    for profile in profiles {
        let size_mb = profile.size as f64 / 1_048_576.0;
        let mut notes = String::new();
        if profile.locked {
            notes.push_str("  (in use)");
        }
        if profile.size > SIZE_WARNING_THRESHOLD {
            has_warnings = true;
            notes.push_str("  Large");
        }

        println!(
            "  {:<20} {:>8.1} MB    {}{}",
            profile.name,
            size_mb,
            profile.path.display(),
            notes
        );
    }

    if has_warnings {
        println!();
        println!("Some profiles exceed 1GB. Use 'stelshop profile clean' to reclaim space.");
    }

    Ok(())
}

/// Remove session data (cookies, storage, caches) from one or all profiles
pub fn clean(config: &Config, name: Option<&str>) -> Result<()> {
    let root = config.browser.profiles_root()?;

    if let Some(name) = name {
        let profile = ProfileManager::persistent(profile_path(&root, name)?)?;
        let removed = profile.clean_session_data()?;
        println!("Cleaned profile '{}' ({} item(s) removed)", name, removed);
        return Ok(());
    }

    let profiles = ProfileManager::list(&root)?;
    if profiles.is_empty() {
        println!("No profiles found.");
        return Ok(());
    }

    let mut cleaned = 0;
    for info in profiles {
        if info.locked {
            println!("  Skipped: {} (in use)", info.name);
            continue;
        }
        let profile = ProfileManager::persistent(info.path)?;
        let removed = profile.clean_session_data()?;
        println!("  Cleaned: {} ({} item(s))", info.name, removed);
        cleaned += 1;
    }

    println!("Session data cleared from {} profile(s)", cleaned);
    Ok(())
}

/// Delete a profile directory
pub fn delete(config: &Config, name: &str, force: bool) -> Result<()> {
    let root = config.browser.profiles_root()?;
    let path = profile_path(&root, name)?;

    let profile = ProfileManager::persistent(path.clone())?;
    if profile.is_locked() {
        return Err(anyhow!(
            "Profile '{}' is in use by a running browser. Close it first.",
            name
        ));
    }

    if !force {
        print!(
            "This will permanently delete profile '{}'.\nType '{}' to confirm: ",
            name, name
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if input.trim() != name {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    fs::remove_dir_all(&path)?;
    println!("Profile '{}' deleted", name);
    Ok(())
}
