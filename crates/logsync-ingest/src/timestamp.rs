//! Chronological keys for exported log files
//!
//! The export mechanism writes one file per five-minute bucket:
//!
//! ```text
//! WorkspaceResourceId=/subscriptions/<id>/.../workspaces/<ws>/y=2024/m=01/d=15/h=10/m=05/PT05M.json
//! ```
//!
//! A bucket that outgrows the append limit continues in `PT05M_1.json`,
//! `PT05M_2.json`, ... The numeric suffix is the split sequence and orders
//! files inside the same minute. Nothing but the path is consulted: storage
//! timestamps are not trusted for ordering.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

#[allow(clippy::expect_used)]
static EXPORT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|/)y=(?P<year>\d+)/m=(?P<month>\d+)/d=(?P<day>\d+)/h=(?P<hour>\d+)/m=(?P<minute>\d+)/\w+?(?:_(?P<seq>\d+))?\.json$",
    )
    .expect("export path pattern is valid")
});

/// Why a path could not be turned into a [`ChronoKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("path does not follow the y=/m=/d=/h=/m=/<name>[_<n>].json layout: {0:?}")]
    Layout(String),

    #[error("{segment} segment {value:?} is out of range")]
    Number { segment: &'static str, value: String },
}

/// Position of a file in its stream's timeline.
///
/// Ordering is lexicographic over `(year, month, day, hour, minute, sequence)`;
/// the derived `Ord` relies on the field order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChronoKey {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// Split sequence, 0 when the file carries no `_<n>` suffix
    pub sequence: u32,
}

impl ChronoKey {
    /// The bucket start as a calendar time, `None` for impossible dates
    /// (the key still orders correctly).
    pub fn bucket_start(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            0,
        )
    }

    /// How far the bucket start lies behind `now` (UTC). Negative when the
    /// export clock runs ahead.
    pub fn lag_at(&self, now: NaiveDateTime) -> Option<TimeDelta> {
        Some(now - self.bucket_start()?)
    }

    /// `(year, month, day, hour, minute)` of the bucket.
    pub fn bucket(&self) -> (u32, u32, u32, u32, u32) {
        (self.year, self.month, self.day, self.hour, self.minute)
    }
}

impl fmt::Display for ChronoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:00",
            self.year, self.month, self.day, self.hour, self.minute
        )?;
        if self.sequence > 0 {
            write!(f, " #{}", self.sequence)?;
        }
        Ok(())
    }
}

/// Resolve the chronological key of an export file path.
pub fn resolve(path: &str) -> Result<ChronoKey, ParseError> {
    let caps = EXPORT_PATH
        .captures(path)
        .ok_or_else(|| ParseError::Layout(path.to_string()))?;

    let number = |segment: &'static str| -> Result<u32, ParseError> {
        match caps.name(segment) {
            None => Ok(0),
            Some(m) => m.as_str().parse().map_err(|_| ParseError::Number {
                segment,
                value: m.as_str().to_string(),
            }),
        }
    };

    Ok(ChronoKey {
        year: number("year")?,
        month: number("month")?,
        day: number("day")?,
        hour: number("hour")?,
        minute: number("minute")?,
        sequence: number("seq")?,
    })
}
