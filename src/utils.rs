//! Utility functions for time handling, string truncation and file system checks.
//!
//! - UTC+8 calendar helpers used for the digest and the frontend store
//! - RFC 3339 (seconds precision) formatting shared by snapshots and watermarks
//! - Char-safe truncation for summaries and log previews
//! - Output directory validation

use chrono::{DateTime, FixedOffset, Utc};
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::HarvestError;

/// Fixed UTC+8 offset. The publisher platform lives on this calendar.
pub fn china_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset")
}

/// `YYYY-MM-DD` of `now` on the UTC+8 calendar.
pub fn china_date(now: DateTime<Utc>) -> String {
    now.with_timezone(&china_offset()).format("%Y-%m-%d").to_string()
}

/// Serde adapter writing timestamps as `2025-05-06T18:30:00+00:00`.
///
/// All persisted timestamps share this exact shape so that plain string
/// comparison orders them chronologically.
pub mod iso_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Keep at most `max` characters of `s`.
///
/// Counts `char`s, not bytes, so multi-byte text is never split mid-character.
///
/// # Arguments
///
/// * `s` - Text to shorten
/// * `max` - Maximum number of characters kept
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let head = truncate_chars(s, max);
    if head.len() == s.len() {
        head
    } else {
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
///
/// # Arguments
///
/// * `path` - Output directory; missing parents are created
///
/// # Errors
///
/// Returns [`HarvestError::Io`] if the directory cannot be created or written.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), HarvestError> {
    fs::create_dir_all(path).await?;
    let scratch = path.join(".__write_check__");
    stdfs::File::create(&scratch)?;
    let _ = stdfs::remove_file(&scratch);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("公众号文章", 3), "公众号");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_china_date_rolls_over() {
        let late = Utc.with_ymd_and_hms(2025, 5, 6, 16, 0, 0).unwrap();
        assert_eq!(china_date(late), "2025-05-07");
        let early = Utc.with_ymd_and_hms(2025, 5, 6, 15, 59, 59).unwrap();
        assert_eq!(china_date(early), "2025-05-06");
    }

    #[test]
    fn test_iso_seconds_format_orders_lexicographically() {
        let a = Utc.with_ymd_and_hms(2025, 5, 6, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 5, 6, 10, 0, 0).unwrap();
        assert_eq!(iso_seconds::format(&a), "2025-05-06T09:00:00+00:00");
        assert!(iso_seconds::format(&a) < iso_seconds::format(&b));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join(".__write_check__").exists());
    }
}
