use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
}

/// Make a SKU usable as part of a file name
pub fn sanitize_for_filename(value: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(value.trim(), "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Path of the failure screenshot for `sku` taken at `at`. Milliseconds are
/// part of the name so SKUs that sanitize alike stay apart.
pub fn screenshot_path(dir: &Path, sku: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "error_{}_{}_{:03}.png",
        sanitize_for_filename(sku),
        at.timestamp(),
        at.timestamp_subsec_millis()
    ))
}

/// Default path for a statistics export written at `at`
pub fn stats_export_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("stats_{}.json", at.format("%Y%m%d_%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_for_filename("GEN/100 X"), "GEN_100_X");
        assert_eq!(sanitize_for_filename("  ../..  "), ".._..");
        assert_eq!(sanitize_for_filename("///"), "unknown");
    }

    #[test]
    fn test_screenshot_path_includes_sku_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let path = screenshot_path(Path::new("screenshots"), "AB 12", at);
        assert_eq!(
            path,
            PathBuf::from(format!("screenshots/error_AB_12_{}_000.png", at.timestamp()))
        );
    }

    #[test]
    fn test_screenshots_of_alike_skus_in_one_second_do_not_collide() {
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let second = first + chrono::Duration::milliseconds(40);
        let dir = Path::new("screenshots");

        let a = screenshot_path(dir, "A/1", first);
        let b = screenshot_path(dir, "A 1", second);
        assert_eq!(first.timestamp(), second.timestamp());
        assert_ne!(a, b);
        assert!(b.to_string_lossy().ends_with("_040.png"));
    }

    #[test]
    fn test_stats_export_path_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 5).unwrap();
        let path = stats_export_path(Path::new("exports"), at);
        assert_eq!(path, PathBuf::from("exports/stats_20240501_083005.json"));
    }
}
