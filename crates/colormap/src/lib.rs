//! # mugimap colormap
//!
//! Bucket color tables and Leaflet map documents for the field index maps.
//!
//! Each index (NDVI, NDWI, GNDVI) has a fixed five-bucket table; values
//! without data render gray. [`write_map_set`] turns the cached per-date
//! records into `index.html`, `ndwi.html` and `gndvi.html`.
//!
//! ## Usage
//!
//! ```ignore
//! use mugimap_colormap::{write_map_set, MapSummary, RenderOptions};
//!
//! let written = write_map_set(&output_dir, &records, &summary, &RenderOptions::default())?;
//! ```

mod render;
mod scheme;

pub use render::{format_value, render_map, write_map_set, MapSummary, RenderOptions};
pub use scheme::{color_for, Bucket, BucketScheme, Rgb};
