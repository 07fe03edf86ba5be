//! Georeferenced band windows returned by the COG reader.

use ndarray::Array2;

/// Affine transform between pixel (col, row) and projected (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Usually negative (north-up).
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Centre of pixel (col, row).
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Top-left corner of pixel (col, row).
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    /// Fractional pixel coordinates of (x, y); NaN for a degenerate transform.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-10 {
            return (f64::NAN, f64::NAN);
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (col, row)
    }

    /// Same resolution, origin moved to the corner of pixel (col, row).
    pub fn shifted(&self, col: usize, row: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_geo_corner(col, row);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Transform for an overview that is `sx` by `sy` times coarser.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            pixel_width: self.pixel_width * sx,
            pixel_height: self.pixel_height * sy,
            row_rotation: self.row_rotation * sy,
            col_rotation: self.col_rotation * sx,
            ..*self
        }
    }

    /// `(min_x, min_y, max_x, max_y)` of a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.pixel_to_geo_corner(0, 0),
            self.pixel_to_geo_corner(width, 0),
            self.pixel_to_geo_corner(0, height),
            self.pixel_to_geo_corner(width, height),
        ];
        corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// A rectangular window of one band in the image's native CRS.
///
/// Cells outside every fetched tile hold NaN.
#[derive(Debug, Clone)]
pub struct BandWindow {
    pub data: Array2<f64>,
    pub transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
}

impl BandWindow {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Value of the cell containing (x, y), `None` outside the window or
    /// for no-data / NaN cells.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (rows, cols) = self.data.dim();
        let (c, r) = (col.floor() as usize, row.floor() as usize);
        if r >= rows || c >= cols {
            return None;
        }
        let v = self.data[(r, c)];
        if v.is_nan() || self.nodata == Some(v) {
            None
        } else {
            Some(v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn pixel_geo_roundtrip() {
        let gt = GeoTransform::new(600_000.0, 3_700_000.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo(3, 7);
        assert_relative_eq!(x, 600_035.0);
        assert_relative_eq!(y, 3_699_925.0);
        let (c, r) = gt.geo_to_pixel(x, y);
        assert_relative_eq!(c, 3.5);
        assert_relative_eq!(r, 7.5);
    }

    #[test]
    fn shifted_and_scaled() {
        let gt = GeoTransform::new(0.0, 100.0, 10.0, -10.0);
        let s = gt.shifted(2, 3);
        assert_relative_eq!(s.origin_x, 20.0);
        assert_relative_eq!(s.origin_y, 70.0);
        let o = gt.scaled(2.0, 2.0);
        assert_relative_eq!(o.pixel_width, 20.0);
        assert_relative_eq!(o.pixel_height, -20.0);
    }

    #[test]
    fn bounds_of_north_up_grid() {
        let gt = GeoTransform::new(0.0, 100.0, 10.0, -10.0);
        assert_eq!(gt.bounds(5, 2), (0.0, 80.0, 50.0, 100.0));
    }

    #[test]
    fn value_at_respects_nodata_and_extent() {
        let window = BandWindow {
            data: array![[1.0, 0.0], [f64::NAN, 4.0]],
            transform: GeoTransform::new(0.0, 20.0, 10.0, -10.0),
            epsg: Some(32652),
            nodata: Some(0.0),
        };
        assert_eq!(window.value_at(5.0, 15.0), Some(1.0));
        assert_eq!(window.value_at(15.0, 15.0), None);
        assert_eq!(window.value_at(5.0, 5.0), None);
        assert_eq!(window.value_at(15.0, 5.0), Some(4.0));
        assert_eq!(window.value_at(25.0, 5.0), None);
        assert_eq!(window.value_at(-1.0, 5.0), None);
    }
}
