//! Date tokens → half-open staging time windows.
//!
//! Staging timestamps were written in China Standard Time, so window bounds are
//! midnights at a fixed `+08:00` offset regardless of the host timezone.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, TimeZone};
use std::fmt;

use crate::error::{KbsyncError, Result};

const STAGING_OFFSET_SECS: i32 = 8 * 3600;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// `[start, end)`; `end == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
}

impl SyncWindow {
    /// Bounds as unix millis, the unit the SQLite staging table stores.
    pub fn as_millis(&self) -> (i64, Option<i64>) {
        (self.start.timestamp_millis(), self.end.map(|e| e.timestamp_millis()))
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start.to_rfc3339(), end.to_rfc3339()),
            None => write!(f, "[{}, +inf)", self.start.to_rfc3339()),
        }
    }
}

fn midnight(date: NaiveDate) -> Result<DateTime<FixedOffset>> {
    FixedOffset::east_opt(STAGING_OFFSET_SECS)
        .ok_or_else(|| KbsyncError::Config("invalid staging offset".to_string()))?
        .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .single()
        .ok_or_else(|| KbsyncError::InvalidWindow(format!("no midnight for {}", date)))
}

fn parse_date(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token.trim(), DATE_FORMAT).ok()
}

/// Resolve `token` (and optional `end_token`) against the calendar date `today`.
pub fn resolve(token: &str, end_token: Option<&str>, today: NaiveDate) -> Result<SyncWindow> {
    let (start, end) = match token.trim() {
        "yesterday" => (today - Duration::days(1), Some(today)),
        "today" => (today, Some(today + Duration::days(1))),
        other => {
            let start = parse_date(other)
                .ok_or_else(|| KbsyncError::InvalidWindow(format!("unrecognized token '{}'", other)))?;
            let end = match end_token {
                Some(raw) => {
                    let end = parse_date(raw);
                    if end.is_none() {
                        log::warn!("End token '{}' is not a date; window left unbounded", raw);
                    }
                    end
                }
                None => None,
            };
            (start, end)
        }
    };

    if let Some(end) = end {
        if end <= start {
            return Err(KbsyncError::InvalidWindow(format!(
                "end {} is not after start {}",
                end, start
            )));
        }
    }

    Ok(SyncWindow {
        start: midnight(start)?,
        end: end.map(midnight).transpose()?,
    })
}

/// [`resolve`] against the host's local calendar date.
pub fn resolve_today(token: &str, end_token: Option<&str>) -> Result<SyncWindow> {
    resolve(token, end_token, Local::now().date_naive())
}
