//! Pipeline configuration.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date::{DateWindow, ObservationDate};
use crate::error::{Error, Result};

/// Everything one run of the pipeline needs to know.
///
/// Paths are relative to the working directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the rendered maps and the history ledger.
    pub output_dir: PathBuf,
    /// Directory of per-date cache records.
    pub cache_dir: PathBuf,
    pub ledger_file: PathBuf,
    /// Marker file receiving the latest newly processed date.
    pub state_file: PathBuf,
    /// CSV export of the field list (`polygon_uu`, `address`).
    pub field_table: PathBuf,
    /// GeoJSON FeatureCollection of field boundaries.
    pub boundaries: PathBuf,
    /// Start of the search window on normal runs.
    pub last_date: ObservationDate,
    /// Start of the search window when rebuilding.
    pub start_date: ObservationDate,
    /// Exclusive end of the search window, `None` for today.
    pub end_date: Option<ObservationDate>,
    /// Nominal ground resolution in metres.
    pub pixel_scale: f64,
    /// Maximum scene cloud cover in percent (exclusive).
    pub cloud_threshold: f64,
    /// Reprocess every date in the window even if cached.
    pub force_rebuild: bool,
}

fn fixed_date(year: i32, month: u32, day: u32) -> ObservationDate {
    ObservationDate::new(NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date"))
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let output_dir = PathBuf::from("output");
        Self {
            cache_dir: output_dir.join("cache"),
            ledger_file: output_dir.join("observation_history.json"),
            output_dir,
            state_file: PathBuf::from("last_processed.txt"),
            field_table: PathBuf::from("新庄麦筆リスト.csv"),
            boundaries: PathBuf::from("field_boundaries.geojson"),
            last_date: fixed_date(2024, 12, 1),
            start_date: fixed_date(2025, 12, 1),
            end_date: None,
            pixel_scale: 10.0,
            cloud_threshold: 50.0,
            force_rebuild: false,
        }
    }
}

impl PipelineConfig {
    /// Move the output tree (maps, ledger and cache) under `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.cache_dir = dir.join("cache");
        self.ledger_file = dir.join("observation_history.json");
        self.output_dir = dir;
        self
    }

    pub fn map_path(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// The `[start, end)` window searched on this run.
    ///
    /// `today` stands in for a missing `end_date`.
    pub fn search_window(&self, today: ObservationDate) -> Result<DateWindow> {
        let start = if self.force_rebuild {
            self.start_date
        } else {
            self.last_date
        };
        DateWindow::new(start, self.end_date.unwrap_or(today))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pixel_scale.is_finite() && self.pixel_scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "pixel_scale",
                value: self.pixel_scale.to_string(),
                reason: "must be a positive number of metres".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.cloud_threshold) {
            return Err(Error::InvalidParameter {
                name: "cloud_threshold",
                value: self.cloud_threshold.to_string(),
                reason: "must be a percentage between 0 and 100".into(),
            });
        }
        Ok(())
    }
}
