//! Error types for the Sentinel-2 imagery source.

use thiserror::Error;

/// Errors produced by STAC search and COG reads.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server does not support Range requests for {url}")]
    RangeNotSupported { url: String },

    #[error("invalid TIFF: {reason}")]
    InvalidTiff { reason: String },

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    #[error("unsupported predictor: {0}")]
    UnsupportedPredictor(u16),

    #[error("unsupported data type: bits_per_sample={bps}, sample_format={sf}")]
    UnsupportedDataType { bps: u16, sf: u16 },

    #[error("unsupported planar configuration: {0} (only chunky=1 supported)")]
    UnsupportedPlanarConfig(u16),

    #[error("unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no IFD entries found in TIFF")]
    NoIfd,

    #[error("bbox does not intersect raster extent")]
    BBoxOutside,

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("asset '{asset}' not found in item '{item}'")]
    MissingAsset { item: String, asset: String },

    #[error("unknown scene '{0}'")]
    UnknownScene(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] mugimap_core::Error),
}

impl From<CloudError> for mugimap_core::Error {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Core(inner) => inner,
            other => mugimap_core::Error::Source(other.to_string()),
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
