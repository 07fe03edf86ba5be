//! Calendar dates of satellite observations.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A calendar date on which imagery was acquired, e.g. `2025-12-14`.
///
/// Serialized as a `YYYY-MM-DD` string, which also makes it usable as a JSON
/// object key in the ledger maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObservationDate(NaiveDate);

impl ObservationDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build from year/month/day, rejecting impossible dates.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| Error::InvalidDate {
                value: format!("{year:04}-{month:02}-{day:02}"),
                reason: "no such calendar date".into(),
            })
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// File stem used for the per-date cache record.
    pub fn file_stem(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for ObservationDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        // ISO datetimes ("2025-12-14T02:13:41Z") carry the date in the first 10 chars.
        let head = trimmed.get(..10).unwrap_or(trimmed);
        NaiveDate::parse_from_str(head, DATE_FORMAT)
            .map(Self)
            .map_err(|e| Error::InvalidDate {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl TryFrom<String> for ObservationDate {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ObservationDate> for String {
    fn from(date: ObservationDate) -> Self {
        date.to_string()
    }
}

impl From<NaiveDate> for ObservationDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// Half-open search window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: ObservationDate,
    pub end: ObservationDate,
}

impl DateWindow {
    pub fn new(start: ObservationDate, end: ObservationDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidParameter {
                name: "date_window",
                value: format!("{start}/{end}"),
                reason: "end date precedes start date".into(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: ObservationDate) -> bool {
        date >= self.start && date < self.end
    }

    /// STAC `datetime` interval string, midnight to midnight (UTC).
    pub fn to_interval(&self) -> String {
        format!("{}T00:00:00Z/{}T00:00:00Z", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip_format() {
        let d: ObservationDate = "2025-12-14".parse().unwrap();
        assert_eq!(d.to_string(), "2025-12-14");
        assert_eq!(d, ObservationDate::from_ymd(2025, 12, 14).unwrap());
    }

    #[test]
    fn parse_accepts_iso_datetime() {
        let d: ObservationDate = "2025-01-05T01:23:45.024Z".parse().unwrap();
        assert_eq!(d.to_string(), "2025-01-05");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("2025-13-01".parse::<ObservationDate>().is_err());
        assert!("yesterday".parse::<ObservationDate>().is_err());
    }

    #[test]
    fn json_string_representation() {
        let d = ObservationDate::from_ymd(2026, 2, 3).unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"2026-02-03\"");
        let back: ObservationDate = serde_json::from_str("\"2026-02-03\"").unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn window_is_half_open() {
        let w = DateWindow::new(
            ObservationDate::from_ymd(2025, 12, 1).unwrap(),
            ObservationDate::from_ymd(2025, 12, 10).unwrap(),
        )
        .unwrap();
        assert!(w.contains(ObservationDate::from_ymd(2025, 12, 1).unwrap()));
        assert!(!w.contains(ObservationDate::from_ymd(2025, 12, 10).unwrap()));
        assert_eq!(w.to_interval(), "2025-12-01T00:00:00Z/2025-12-10T00:00:00Z");
    }

    #[test]
    fn window_rejects_reversed_range() {
        let a = ObservationDate::from_ymd(2025, 12, 10).unwrap();
        let b = ObservationDate::from_ymd(2025, 12, 1).unwrap();
        assert!(DateWindow::new(a, b).is_err());
    }
}
