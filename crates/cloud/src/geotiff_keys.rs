//! GeoTIFF georeferencing from IFD tags.
//!
//! Reads ModelPixelScale + ModelTiepoint (or ModelTransformation), the
//! GeoKeyDirectory CRS code and GDAL_NODATA.

use crate::ifd::{tags, ResolvedIfd};
use crate::raster::GeoTransform;

const GEOGRAPHIC_TYPE_GEO_KEY: u64 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u64 = 3072;

/// Georeferencing of the full-resolution image.
#[derive(Debug, Clone)]
pub struct GeoTiffMeta {
    pub geo_transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
}

pub fn extract_geotiff_meta(ifd: &ResolvedIfd) -> GeoTiffMeta {
    GeoTiffMeta {
        geo_transform: extract_geotransform(ifd),
        epsg: extract_epsg(ifd),
        nodata: extract_nodata(ifd),
    }
}

fn extract_geotransform(ifd: &ResolvedIfd) -> GeoTransform {
    let scale = ifd.f64_values(tags::MODEL_PIXEL_SCALE);
    let tiepoint = ifd.f64_values(tags::MODEL_TIEPOINT);
    if scale.len() >= 2 && tiepoint.len() >= 6 {
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]);
    }

    // Row-major 4x4 matrix; the first two rows hold the affine terms.
    let t = ifd.f64_values(tags::MODEL_TRANSFORMATION);
    if t.len() >= 16 {
        return GeoTransform {
            origin_x: t[3],
            origin_y: t[7],
            pixel_width: t[0],
            pixel_height: t[5],
            row_rotation: t[1],
            col_rotation: t[4],
        };
    }

    GeoTransform::default()
}

/// `[version, revision, minor, count, (key, location, count, value)*]`
fn extract_epsg(ifd: &ResolvedIfd) -> Option<u32> {
    let dir = ifd.u64_values(tags::GEO_KEY_DIRECTORY);
    let num_keys = *dir.get(3)? as usize;

    let keys: Vec<&[u64]> = dir[4..].chunks_exact(4).take(num_keys).collect();
    let code_for = |id: u64| {
        keys.iter()
            .find(|k| k[0] == id && k[1] == 0 && k[3] > 0)
            .map(|k| k[3] as u32)
    };
    code_for(PROJECTED_CS_TYPE_GEO_KEY).or_else(|| code_for(GEOGRAPHIC_TYPE_GEO_KEY))
}

fn extract_nodata(ifd: &ResolvedIfd) -> Option<f64> {
    ifd.ascii(tags::GDAL_NODATA)?.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::{parse_ifd, tests::le_ifd, TiffByteOrder};

    fn le_f64(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn le_u16(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn utm_tile_georeferencing() {
        let data = le_ifd(&[
            (tags::MODEL_PIXEL_SCALE, 12, 3, 1000),
            (tags::MODEL_TIEPOINT, 12, 6, 1100),
            (tags::GEO_KEY_DIRECTORY, 3, 12, 1200),
            (tags::GDAL_NODATA, 2, 2, u32::from_le_bytes([b'0', 0, 0, 0])),
        ]);
        let raw = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let fetched = vec![
            (tags::MODEL_PIXEL_SCALE, le_f64(&[10.0, 10.0, 0.0])),
            (tags::MODEL_TIEPOINT, le_f64(&[0.0, 0.0, 0.0, 600_000.0, 3_700_020.0, 0.0])),
            (
                tags::GEO_KEY_DIRECTORY,
                le_u16(&[1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32652]),
            ),
        ];
        let meta = extract_geotiff_meta(&raw.resolve(TiffByteOrder::LittleEndian, fetched));

        assert_eq!(meta.geo_transform, GeoTransform::new(600_000.0, 3_700_020.0, 10.0, -10.0));
        assert_eq!(meta.epsg, Some(32652));
        assert_eq!(meta.nodata, Some(0.0));
    }

    #[test]
    fn missing_tags_fall_back() {
        let data = le_ifd(&[]);
        let raw = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let meta = extract_geotiff_meta(&raw.resolve(TiffByteOrder::LittleEndian, Vec::new()));
        assert_eq!(meta.geo_transform, GeoTransform::default());
        assert_eq!(meta.epsg, None);
        assert_eq!(meta.nodata, None);
    }
}
