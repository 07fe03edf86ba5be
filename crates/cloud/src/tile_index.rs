//! Tile grid math for COG files.
//!
//! Maps a bounding box in the image CRS to the tiles covering it and the
//! pixel window they contribute to.

use crate::raster::GeoTransform;

/// An axis-aligned bounding box in some CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Grown by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }
}

/// One tile to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    /// Linear index into the TIFF tile arrays.
    pub tile_idx: usize,
    pub tile_col: usize,
    pub tile_row: usize,
}

/// Tiles and pixel window covering a bbox.
#[derive(Debug, Clone)]
pub struct TileMapping {
    pub tiles: Vec<TileRequest>,
    /// `(min_col, min_row, max_col_exclusive, max_row_exclusive)` in image pixels.
    pub pixel_window: (usize, usize, usize, usize),
    /// Output `(rows, cols)`.
    pub output_shape: (usize, usize),
}

/// Tiles needed to cover `bbox`, or `None` if it misses the image.
pub fn tiles_for_bbox(
    bbox: &BBox,
    geo_transform: &GeoTransform,
    image_width: u32,
    image_height: u32,
    tile_width: u32,
    tile_height: u32,
) -> Option<TileMapping> {
    let iw = image_width as usize;
    let ih = image_height as usize;
    let tw = tile_width.max(1) as usize;
    let th = tile_height.max(1) as usize;

    // min_y maps to the bottom row for north-up images.
    let (col_a, row_a) = geo_transform.geo_to_pixel(bbox.min_x, bbox.max_y);
    let (col_b, row_b) = geo_transform.geo_to_pixel(bbox.max_x, bbox.min_y);
    if !(col_a.is_finite() && row_a.is_finite() && col_b.is_finite() && row_b.is_finite()) {
        return None;
    }

    let clamp = |v: f64, hi: usize| (v.max(0.0) as usize).min(hi);
    let min_col = clamp(col_a.min(col_b).floor(), iw);
    let max_col = clamp(col_a.max(col_b).ceil(), iw);
    let min_row = clamp(row_a.min(row_b).floor(), ih);
    let max_row = clamp(row_a.max(row_b).ceil(), ih);

    if min_col >= max_col || min_row >= max_row {
        return None;
    }

    let tiles_across = iw.div_ceil(tw);
    let tiles: Vec<TileRequest> = (min_row / th..max_row.div_ceil(th))
        .flat_map(|tile_row| {
            (min_col / tw..max_col.div_ceil(tw)).map(move |tile_col| TileRequest {
                tile_idx: tile_row * tiles_across + tile_col,
                tile_col,
                tile_row,
            })
        })
        .collect();

    Some(TileMapping {
        tiles,
        pixel_window: (min_col, min_row, max_col, max_row),
        output_shape: (max_row - min_row, max_col - min_col),
    })
}
