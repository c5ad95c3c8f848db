// src/ingest/dates.rs
//! Publication timestamp parsing. Everything ends up as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// What to do with a record whose date is missing or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFallback {
    /// Stamp the record with the run time.
    #[default]
    RunTime,
    /// Treat the record as malformed.
    Reject,
}

/// Accepts RFC 3339, naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` (read as UTC),
/// bare `YYYY-MM-DD` (midnight UTC) and RFC 2822 feed dates.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
    }

    parse_rfc2822(s)
}

fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    use time::format_description::well_known::Rfc2822;
    let odt = time::OffsetDateTime::parse(s, &Rfc2822).ok()?;
    Utc.timestamp_opt(odt.unix_timestamp(), odt.nanosecond())
        .single()
}

/// Resolve a raw date under the fallback policy. `None` means reject.
pub fn resolve(raw: Option<&str>, now: DateTime<Utc>, fallback: DateFallback) -> Option<DateTime<Utc>> {
    match raw.and_then(parse_published_at) {
        Some(dt) => Some(dt),
        None => match fallback {
            DateFallback::RunTime => Some(now),
            DateFallback::Reject => None,
        },
    }
}

pub fn to_iso_millis(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
