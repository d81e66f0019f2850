//! Timestamp normalization for model-generated evidence.
//!
//! Timestamps embedded in a model reply are free text. Each accepted layout is
//! tried in a fixed order and the first successful parse wins; anything that
//! matches no layout falls back to the current time instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Accepted layouts, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampLayout {
    /// `2024-05-01T12:30:00Z`, `2024-05-01T12:30:00+02:00`
    Rfc3339,
    /// `2024-05-01T12:30:00.123456789Z`
    Rfc3339Nano,
    /// `2024-05-01T12:30:00[.fff]`, read as UTC
    NaiveDateTime,
    /// `2024-05-01 12:30:00[.fff]`, read as UTC
    SpaceSeparated,
    /// `12:30:00[.fff]`, placed on 0000-01-01 UTC
    TimeOfDay,
}

impl TimestampLayout {
    pub const ORDERED: [TimestampLayout; 5] = [
        TimestampLayout::Rfc3339,
        TimestampLayout::Rfc3339Nano,
        TimestampLayout::NaiveDateTime,
        TimestampLayout::SpaceSeparated,
        TimestampLayout::TimeOfDay,
    ];

    pub fn parse(self, raw: &str) -> Option<DateTime<Utc>> {
        match self {
            TimestampLayout::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimestampLayout::Rfc3339Nano => DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%#z")
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimestampLayout::NaiveDateTime => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc()),
            TimestampLayout::SpaceSeparated => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc()),
            TimestampLayout::TimeOfDay => {
                let time = NaiveTime::parse_from_str(raw, "%H:%M:%S%.f").ok()?;
                NaiveDate::from_ymd_opt(0, 1, 1).map(|date| date.and_time(time).and_utc())
            }
        }
    }
}

/// Parse `raw` with the first matching layout, or `None` if none match.
pub fn parse_timestamp(raw: &str) -> Option<(TimestampLayout, DateTime<Utc>)> {
    let raw = raw.trim();
    TimestampLayout::ORDERED
        .iter()
        .find_map(|layout| layout.parse(raw).map(|t| (*layout, t)))
}

/// Normalize `raw`, substituting the current wall-clock time when no layout matches.
pub fn normalize_timestamp(raw: &str) -> DateTime<Utc> {
    normalize_timestamp_or(raw, Utc::now)
}

/// Normalize `raw`, calling `fallback` only when no layout matches.
pub fn normalize_timestamp_or<F>(raw: &str, fallback: F) -> DateTime<Utc>
where
    F: FnOnce() -> DateTime<Utc>,
{
    match parse_timestamp(raw) {
        Some((_, t)) => t,
        None => fallback(),
    }
}
