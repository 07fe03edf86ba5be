//! Imagery analysis algorithms
//!
//! - Spectral indices: NDVI, NDWI (SWIR), GNDVI
//! - Normalized difference: generic two-band index, scalar and windowed
//! - Reflectance scaling of L2A digital numbers
//! - Cloud mask from the SCL band

pub mod cloud_mask;
mod indices;

pub use cloud_mask::{CloudMask, SclClass};
pub use indices::{
    gndvi, ndvi, ndwi, normalized_difference, normalized_difference_grid, BandSample,
    IndexValues, ReflectanceScale,
};
