//! Per-date cache records on disk, one `<YYYY-MM-DD>.json` per observation date.

use std::path::{Path, PathBuf};

use crate::date::ObservationDate;
use crate::error::Result;
use crate::io::{read_json, read_json_opt, write_json};
use crate::record::DateCacheRecord;

/// Directory of per-date cache records.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `date`, whether or not it exists yet.
    pub fn path_for(&self, date: ObservationDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.file_stem()))
    }

    pub fn exists(&self, date: ObservationDate) -> bool {
        self.path_for(date).is_file()
    }

    /// Write (or overwrite) the record for its date.
    pub fn write(&self, record: &DateCacheRecord) -> Result<PathBuf> {
        let path = self.path_for(record.date);
        write_json(&path, record)?;
        tracing::debug!(
            "cached {} fields / {} pixels for {} at {}",
            record.fields.len(),
            record.pixel_count(),
            record.date,
            path.display()
        );
        Ok(path)
    }

    pub fn read(&self, date: ObservationDate) -> Result<DateCacheRecord> {
        read_json(self.path_for(date))
    }

    /// Read the record for `date`, `None` if no file exists.
    pub fn read_opt(&self, date: ObservationDate) -> Result<Option<DateCacheRecord>> {
        read_json_opt(self.path_for(date))
    }

    /// Read every date in order, skipping dates whose file is missing.
    ///
    /// Skipped dates are logged at `warn` and not reprocessed.
    pub fn read_all(&self, dates: &[ObservationDate]) -> Result<Vec<DateCacheRecord>> {
        let mut records = Vec::with_capacity(dates.len());
        for &date in dates {
            match self.read_opt(date)? {
                Some(record) => records.push(record),
                None => tracing::warn!(
                    "cache file for {} missing at {}, skipping",
                    date,
                    self.path_for(date).display()
                ),
            }
        }
        Ok(records)
    }
}
