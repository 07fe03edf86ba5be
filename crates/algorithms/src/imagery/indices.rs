//! Spectral indices for wheat monitoring
//!
//! Three normalized-difference indices computed from Sentinel-2 L2A bands:
//! NDVI (B8/B4), NDWI (B8/B11) and GNDVI (B8/B3). Each is available as a
//! scalar function for single pixels and as an `Array2` version for band
//! windows, where undefined pixels become NaN.

use ndarray::{Array2, Zip};
use mugimap_core::{Error, IndexKind, Result};

/// Sums closer to zero than this are treated as zero.
const ZERO_SUM: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// Normalized difference of two reflectances:
///
/// `(a - b) / (a + b)`
///
/// Result is in [-1, 1] for non-negative inputs. `None` when the sum is zero
/// or either input is not finite.
#[inline]
pub fn normalized_difference(a: f64, b: f64) -> Option<f64> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    let sum = a + b;
    if sum.abs() < ZERO_SUM {
        return None;
    }
    Some((a - b) / sum)
}

/// Normalized difference over two equally-sized band windows.
///
/// Undefined pixels are NaN.
pub fn normalized_difference_grid(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    check_dimensions(a, b)?;
    let mut out = Array2::from_elem(a.raw_dim(), f64::NAN);
    Zip::from(&mut out).and(a).and(b).for_each(|o, &a, &b| {
        if let Some(v) = normalized_difference(a, b) {
            *o = v;
        }
    });
    Ok(out)
}

// ---------------------------------------------------------------------------
// Named indices
// ---------------------------------------------------------------------------

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// Winter wheat runs from ~0.2 after emergence to 0.8+ at heading.
pub fn ndvi(nir: f64, red: f64) -> Option<f64> {
    normalized_difference(nir, red)
}

/// Normalized Difference Water Index (Gao, SWIR variant)
///
/// `NDWI = (NIR - SWIR1) / (NIR + SWIR1)`
///
/// Tracks canopy water content rather than open water.
pub fn ndwi(nir: f64, swir1: f64) -> Option<f64> {
    normalized_difference(nir, swir1)
}

/// Green Normalized Difference Vegetation Index
///
/// `GNDVI = (NIR - Green) / (NIR + Green)`
///
/// More sensitive to chlorophyll than NDVI at high biomass.
pub fn gndvi(nir: f64, green: f64) -> Option<f64> {
    normalized_difference(nir, green)
}

/// Surface reflectances of the four bands used by the indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSample {
    /// B3
    pub green: f64,
    /// B4
    pub red: f64,
    /// B8
    pub nir: f64,
    /// B11
    pub swir16: f64,
}

/// NDVI, NDWI, GNDVI of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndexValues {
    pub ndvi: Option<f64>,
    pub ndwi: Option<f64>,
    pub gndvi: Option<f64>,
}

impl IndexValues {
    pub fn get(&self, kind: IndexKind) -> Option<f64> {
        match kind {
            IndexKind::Ndvi => self.ndvi,
            IndexKind::Ndwi => self.ndwi,
            IndexKind::Gndvi => self.gndvi,
        }
    }
}

impl BandSample {
    pub fn index(&self, kind: IndexKind) -> Option<f64> {
        match kind {
            IndexKind::Ndvi => ndvi(self.nir, self.red),
            IndexKind::Ndwi => ndwi(self.nir, self.swir16),
            IndexKind::Gndvi => gndvi(self.nir, self.green),
        }
    }

    pub fn indices(&self) -> IndexValues {
        IndexValues {
            ndvi: self.index(IndexKind::Ndvi),
            ndwi: self.index(IndexKind::Ndwi),
            gndvi: self.index(IndexKind::Gndvi),
        }
    }
}

// ---------------------------------------------------------------------------
// Reflectance scaling
// ---------------------------------------------------------------------------

/// Conversion from L2A digital numbers to surface reflectance.
///
/// `reflectance = DN * scale + offset`. Processing baseline 04.00 and later
/// products carry `offset = -0.1`; Earth Search assets already have it
/// removed, so the default is 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectanceScale {
    pub scale: f64,
    pub offset: f64,
    /// DN marking no-data (0 for Sentinel-2).
    pub nodata: f64,
}

impl Default for ReflectanceScale {
    fn default() -> Self {
        Self {
            scale: 1.0 / 10_000.0,
            offset: 0.0,
            nodata: 0.0,
        }
    }
}

impl ReflectanceScale {
    pub fn with_offset(offset: f64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Reflectance of one DN, `None` for no-data or non-finite DNs.
    ///
    /// Clamped at 0, so a negative offset never yields negative reflectance.
    #[inline]
    pub fn apply(&self, dn: f64) -> Option<f64> {
        if !dn.is_finite() || dn == self.nodata {
            return None;
        }
        Some((dn * self.scale + self.offset).max(0.0))
    }

    /// Scale a DN window in place; no-data pixels become NaN.
    pub fn apply_grid(&self, dn: &mut Array2<f64>) {
        dn.mapv_inplace(|v| self.apply(v).unwrap_or(f64::NAN));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_dimensions(a: &Array2<f64>, b: &Array2<f64>) -> Result<()> {
    if a.dim() != b.dim() {
        let (er, ec) = a.dim();
        let (ar, ac) = b.dim();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}
