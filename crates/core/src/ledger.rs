//! Observation history ledger.
//!
//! A single JSON document listing every processed observation date together
//! with the source scene identifier and the number of pixels sampled:
//!
//! ```json
//! { "dates": ["2025-12-02", "2025-12-14"],
//!   "date_to_index": { "2025-12-02": "S2B_52SGE_20251202_0_L2A", ... },
//!   "pixel_counts":  { "2025-12-02": 1834, ... } }
//! ```
//!
//! `dates` keeps insertion order on disk; callers that need calendar order
//! use [`HistoryLedger::sorted_dates`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::date::ObservationDate;
use crate::error::{Error, Result};
use crate::io::{read_json_opt, write_json};

/// On-disk shape. Kept private so every ledger goes through validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    dates: Vec<ObservationDate>,
    #[serde(default)]
    date_to_index: BTreeMap<ObservationDate, String>,
    #[serde(default)]
    pixel_counts: BTreeMap<ObservationDate, u64>,
}

/// History of all processed observation dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LedgerDocument", into = "LedgerDocument")]
pub struct HistoryLedger {
    dates: Vec<ObservationDate>,
    date_to_index: BTreeMap<ObservationDate, String>,
    pixel_counts: BTreeMap<ObservationDate, u64>,
}

impl HistoryLedger {
    /// An empty ledger (first run).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from its parts, rejecting duplicate dates and
    /// blank source identifiers.
    pub fn from_parts(
        dates: Vec<ObservationDate>,
        date_to_index: BTreeMap<ObservationDate, String>,
        pixel_counts: BTreeMap<ObservationDate, u64>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(dates.len());
        for date in &dates {
            if !seen.insert(*date) {
                return Err(Error::InvalidLedger(format!("date {date} listed twice")));
            }
        }
        if let Some((date, _)) = date_to_index.iter().find(|(_, id)| id.trim().is_empty()) {
            return Err(Error::InvalidLedger(format!(
                "empty source identifier for {date}"
            )));
        }
        Ok(Self {
            dates,
            date_to_index,
            pixel_counts,
        })
    }

    /// Load the ledger at `path`, or start an empty one if the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match read_json_opt::<HistoryLedger, _>(path)? {
            Some(ledger) => {
                tracing::debug!("loaded ledger with {} dates from {}", ledger.len(), path.display());
                Ok(ledger)
            }
            None => {
                tracing::debug!("no ledger at {}, starting empty", path.display());
                Ok(Self::new())
            }
        }
    }

    /// Persist the ledger (indented, written via temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, self)
    }

    /// Dates in insertion order.
    pub fn dates(&self) -> &[ObservationDate] {
        &self.dates
    }

    /// Dates in ascending calendar order.
    pub fn sorted_dates(&self) -> Vec<ObservationDate> {
        let mut dates = self.dates.clone();
        dates.sort();
        dates
    }

    pub fn contains(&self, date: ObservationDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn source_id(&self, date: ObservationDate) -> Option<&str> {
        self.date_to_index.get(&date).map(String::as_str)
    }

    pub fn pixel_count(&self, date: ObservationDate) -> Option<u64> {
        self.pixel_counts.get(&date).copied()
    }

    /// Sum of all recorded pixel counts.
    pub fn total_pixels(&self) -> u64 {
        self.pixel_counts.values().sum()
    }

    /// Point `date` at `source_id`, replacing any earlier identifier.
    pub fn assign_source(&mut self, date: ObservationDate, source_id: impl Into<String>) {
        self.date_to_index.insert(date, source_id.into());
    }

    /// Record `source_id` for `date` only if the date has none yet.
    pub fn remember_source(&mut self, date: ObservationDate, source_id: impl Into<String>) {
        self.date_to_index
            .entry(date)
            .or_insert_with(|| source_id.into());
    }

    /// Mark `date` as processed with `pixels` samples. Appends the date on
    /// first sight; later calls only update the count.
    pub fn record_processed(&mut self, date: ObservationDate, pixels: u64) {
        if !self.dates.contains(&date) {
            self.dates.push(date);
        }
        self.pixel_counts.insert(date, pixels);
    }
}

impl TryFrom<LedgerDocument> for HistoryLedger {
    type Error = Error;

    fn try_from(doc: LedgerDocument) -> Result<Self> {
        Self::from_parts(doc.dates, doc.date_to_index, doc.pixel_counts)
    }
}

impl From<HistoryLedger> for LedgerDocument {
    fn from(ledger: HistoryLedger) -> Self {
        Self {
            dates: ledger.dates,
            date_to_index: ledger.date_to_index,
            pixel_counts: ledger.pixel_counts,
        }
    }
}
