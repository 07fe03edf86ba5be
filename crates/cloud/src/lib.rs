//! # mugimap cloud
//!
//! Remote Sentinel-2 L2A access: STAC search plus Cloud Optimized GeoTIFF
//! (COG) reads over HTTP Range requests.
//!
//! Only the tiles covering a field are fetched. Decoded tiles stay in an LRU
//! cache for the lifetime of a reader, which lasts for one scene.
//!
//! ## Features
//!
//! - `deflate` (default): DEFLATE decompression via `flate2`
//! - `lzw` (default): LZW decompression via `weezl`

pub mod cache;
pub mod cog_reader;
pub mod decompress;
pub mod error;
pub mod geotiff_keys;
pub mod http;
pub mod ifd;
pub mod raster;
pub mod reproject;
pub mod sentinel2;
pub mod stac_client;
pub mod stac_models;
pub mod tile_index;

pub use cog_reader::{CogMetadata, CogReader, CogReaderOptions};
pub use error::{CloudError, Result};
pub use raster::{BandWindow, GeoTransform};
pub use reproject::Projection;
pub use sentinel2::{Sentinel2Options, Sentinel2Source};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
pub use tile_index::BBox;
