//! Freshness checks shared by the response cache and the published catalog.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::path::Path;

/// Default age after which a cached upstream response is refetched.
pub const RESPONSE_CACHE_TTL_HOURS: i64 = 24;

/// Default age after which the published catalog should be rebuilt.
pub const CATALOG_STALE_AFTER_DAYS: i64 = 7;

/// True when `last` is absent or strictly older than `max_age` at `now`.
pub fn is_stale(last: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match last {
        Some(last) => now - last > max_age,
        None => true,
    }
}

/// Parse an ISO-8601 timestamp.
///
/// RFC 3339 strings are used as-is. Naive timestamps without an offset
/// (older markers) are interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read a timestamp marker file. A missing file yields `None`.
pub fn read_marker(path: impl AsRef<Path>) -> Result<Option<DateTime<Utc>>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read timestamp marker: {}", path.display()))?;

    let parsed = parse_timestamp(&content);
    if parsed.is_none() {
        tracing::warn!(path = %path.display(), "Unparseable timestamp marker, treating as absent");
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_timestamp_is_stale() {
        assert!(is_stale(None, Utc::now(), Duration::days(7)));
    }

    #[test]
    fn test_stale_boundary() {
        let now = Utc::now();
        let max_age = Duration::hours(RESPONSE_CACHE_TTL_HOURS);

        assert!(!is_stale(Some(now - Duration::hours(23)), now, max_age));
        assert!(!is_stale(Some(now - max_age), now, max_age));
        assert!(is_stale(Some(now - Duration::hours(25)), now, max_age));
    }

    #[test]
    fn test_parse_rfc3339_and_naive() {
        let rfc = parse_timestamp("2024-05-01T12:30:00+00:00").unwrap();
        let naive = parse_timestamp("2024-05-01T12:30:00.123456").unwrap();

        assert_eq!(rfc.timestamp(), 1_714_566_600);
        assert_eq!(naive.timestamp(), 1_714_566_600);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_read_marker() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("last_update.txt");

        assert_eq!(read_marker(&path)?, None);

        std::fs::write(&path, "2024-05-01T12:30:00Z\n")?;
        assert!(read_marker(&path)?.is_some());

        Ok(())
    }
}
