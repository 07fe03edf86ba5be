//! Per-date cache record types.
//!
//! These mirror the on-disk JSON layout of `cache/<date>.json`:
//!
//! ```json
//! { "date": "2025-12-14",
//!   "fields": [ { "polygon_uu": "...", "address": "...",
//!                 "boundary": [[lon, lat], ...],
//!                 "pixels": [ { "lat": .., "lon": .., "ndvi": .., "ndwi": .., "gndvi": .. } ] } ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::date::ObservationDate;

/// The three normalized-difference indices carried by every pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKind {
    /// Vegetation vigour, (B8 - B4) / (B8 + B4)
    Ndvi,
    /// Canopy water content, (B8 - B11) / (B8 + B11)
    Ndwi,
    /// Chlorophyll, (B8 - B3) / (B8 + B3)
    Gndvi,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [Self::Ndvi, Self::Ndwi, Self::Gndvi];

    /// Upper-case display name, also used as the layer-name prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Ndwi => "NDWI",
            Self::Gndvi => "GNDVI",
        }
    }

    /// Output document for this index. NDVI is the landing page.
    pub fn output_file(&self) -> &'static str {
        match self {
            Self::Ndvi => "index.html",
            Self::Ndwi => "ndwi.html",
            Self::Gndvi => "gndvi.html",
        }
    }
}

/// One sampled pixel centre with its index values.
///
/// Index values are `None` when undefined (both input bands zero).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelRecord {
    pub lat: f64,
    pub lon: f64,
    pub ndvi: Option<f64>,
    pub ndwi: Option<f64>,
    pub gndvi: Option<f64>,
}

impl PixelRecord {
    pub fn value(&self, kind: IndexKind) -> Option<f64> {
        match kind {
            IndexKind::Ndvi => self.ndvi,
            IndexKind::Ndwi => self.ndwi,
            IndexKind::Gndvi => self.gndvi,
        }
    }
}

/// All pixels of one field on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub polygon_uu: String,
    pub address: String,
    /// Outer ring as `[lon, lat]` pairs.
    pub boundary: Vec<[f64; 2]>,
    pub pixels: Vec<PixelRecord>,
}

impl FieldRecord {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

/// Everything cached for a single observation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateCacheRecord {
    pub date: ObservationDate,
    pub fields: Vec<FieldRecord>,
}

impl DateCacheRecord {
    pub fn new(date: ObservationDate) -> Self {
        Self {
            date,
            fields: Vec::new(),
        }
    }

    /// Total pixel count across all fields.
    pub fn pixel_count(&self) -> usize {
        self.fields.iter().map(FieldRecord::pixel_count).sum()
    }
}
