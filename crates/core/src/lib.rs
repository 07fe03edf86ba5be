//! # mugimap core
//!
//! Data model, on-disk state and the incremental sync engine for the wheat
//! field index maps.
//!
//! This crate provides:
//! - `ObservationDate` / `DateWindow`: validated calendar dates
//! - `DateCacheRecord`: per-date pixel samples for every field
//! - `CacheStore`: one JSON record per observation date
//! - `HistoryLedger`: all processed dates, source ids and pixel counts
//! - `ImagerySource`: the seam to a satellite archive
//! - `IncrementalSync`: new/existing partition and ledger merge

pub mod config;
pub mod date;
pub mod error;
pub mod field;
pub mod io;
pub mod ledger;
pub mod record;
pub mod source;
pub mod store;
pub mod sync;

pub use config::PipelineConfig;
pub use date::{DateWindow, ObservationDate};
pub use error::{Error, Result};
pub use field::{FieldTable, FieldTarget};
pub use ledger::HistoryLedger;
pub use record::{DateCacheRecord, FieldRecord, IndexKind, PixelRecord};
pub use source::{ImagerySource, Region, Scene};
pub use store::CacheStore;
pub use sync::{DateReport, FieldOutcome, IncrementalSync, SyncOutcome, SyncPlan};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::date::{DateWindow, ObservationDate};
    pub use crate::error::{Error, Result};
    pub use crate::field::{FieldTable, FieldTarget};
    pub use crate::ledger::HistoryLedger;
    pub use crate::record::{DateCacheRecord, FieldRecord, IndexKind, PixelRecord};
    pub use crate::source::{ImagerySource, Region, Scene};
    pub use crate::store::CacheStore;
    pub use crate::sync::{FieldOutcome, IncrementalSync, SyncOutcome};
}
