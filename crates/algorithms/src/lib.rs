//! # mugimap algorithms
//!
//! Pixel-level computations for the field index maps.
//!
//! ## Modules
//!
//! - **imagery**: NDVI/NDWI/GNDVI, reflectance scaling, SCL cloud mask

pub mod imagery;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        gndvi, ndvi, ndwi, normalized_difference, normalized_difference_grid, BandSample,
        CloudMask, IndexValues, ReflectanceScale, SclClass,
    };
    pub use mugimap_core::prelude::*;
}
