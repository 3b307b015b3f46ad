//! Permissive time-window parsing for the query surfaces.
//!
//! `since`/`until` accept `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `Nd` (N days
//! back), and `Nm` (N months back, 30-day months). Partial dates pad to
//! the first instant of the year/month/day. Unparseable input falls back
//! to the provided default.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Parses one window endpoint.
#[must_use]
pub fn parse_point(s: &str, default: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let s = s.trim();
    if s.is_empty() {
        return default;
    }

    // Relative forms: Nd and Nm.
    if let Some(days) = s.strip_suffix('d').and_then(|n| n.parse::<i64>().ok()) {
        return now - Duration::days(days);
    }
    if let Some(months) = s.strip_suffix('m').and_then(|n| n.parse::<i64>().ok()) {
        return now - Duration::days(30 * months);
    }

    // Partial dates pad to the first instant of the period.
    let parts: Vec<&str> = s.split('-').collect();
    let padded = match parts.len() {
        1 => format!("{s}-01-01"),
        2 => format!("{s}-01"),
        _ => s.to_string(),
    };

    NaiveDate::parse_from_str(&padded, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or(default, |dt| Utc.from_utc_datetime(&dt))
}

/// Resolves an optional `since`/`until` pair into a concrete window,
/// defaulting to the epoch and now.
#[must_use]
pub fn parse_window(
    since: Option<&str>,
    until: Option<&str>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = since.map_or(DateTime::<Utc>::UNIX_EPOCH, |s| {
        parse_point(s, DateTime::<Utc>::UNIX_EPOCH, now)
    });
    let end = until.map_or(now, |s| parse_point(s, now, now));
    (start, end)
}
