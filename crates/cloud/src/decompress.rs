//! Tile decompression and sample decoding for COG tiles.
//!
//! Supports DEFLATE (via `flate2`), LZW (via `weezl`) and uncompressed tiles,
//! with optional horizontal differencing (predictor 2) on integer samples.

use crate::error::{CloudError, Result};
use crate::ifd::{IfdInfo, TiffByteOrder};

/// TIFF compression codes.
pub mod compression {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// TIFF sample format codes.
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

/// TIFF predictor codes.
pub mod predictor {
    pub const NONE: u16 = 1;
    pub const HORIZONTAL: u16 = 2;
}

/// Decompress raw tile bytes according to the compression method.
pub fn decompress_tile(data: &[u8], compression_code: u16, expected_raw_size: usize) -> Result<Vec<u8>> {
    match compression_code {
        compression::NONE => Ok(data.to_vec()),

        #[cfg(feature = "deflate")]
        compression::DEFLATE | compression::ADOBE_DEFLATE => {
            use std::io::Read;
            // TIFF DEFLATE is zlib-wrapped; a few writers emit raw deflate.
            let mut out = Vec::with_capacity(expected_raw_size);
            let zlib = flate2::read::ZlibDecoder::new(data).read_to_end(&mut out);
            if zlib.is_err() {
                out.clear();
                flate2::read::DeflateDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| CloudError::Decompress(format!("DEFLATE: {}", e)))?;
            }
            Ok(out)
        }

        #[cfg(feature = "lzw")]
        compression::LZW => {
            weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .decode(data)
                .map_err(|e| CloudError::Decompress(format!("LZW: {}", e)))
        }

        _ => Err(CloudError::UnsupportedCompression(compression_code)),
    }
}

/// How decoded tile bytes are laid out.
#[derive(Debug, Clone, Copy)]
pub struct SampleLayout {
    pub byte_order: TiffByteOrder,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub predictor: u16,
    /// Samples per tile row (tile width times samples per pixel).
    pub row_len: usize,
    pub samples_per_pixel: usize,
}

impl SampleLayout {
    pub fn for_ifd(ifd: &IfdInfo, byte_order: TiffByteOrder) -> Self {
        Self {
            byte_order,
            bits_per_sample: ifd.bits_per_sample,
            sample_format: ifd.sample_format,
            predictor: ifd.predictor,
            row_len: ifd.tile_width as usize * ifd.samples_per_pixel.max(1) as usize,
            samples_per_pixel: ifd.samples_per_pixel.max(1) as usize,
        }
    }
}

/// Decode decompressed tile bytes into f64 samples, undoing the predictor.
pub fn decode_samples(raw: &[u8], layout: &SampleLayout) -> Result<Vec<f64>> {
    let bps = layout.bits_per_sample;
    let sf = layout.sample_format;
    let order = layout.byte_order;

    match (sf, bps) {
        (sample_format::UNSIGNED_INT | sample_format::SIGNED_INT, 8 | 16 | 32) => {
            let width = bps as usize / 8;
            let mut values: Vec<u64> = raw
                .chunks_exact(width)
                .map(|chunk| match width {
                    1 => chunk[0] as u64,
                    2 => order.read_u16(chunk) as u64,
                    _ => order.read_u32(chunk) as u64,
                })
                .collect();

            match layout.predictor {
                predictor::NONE => {}
                predictor::HORIZONTAL => {
                    undo_horizontal(&mut values, layout.row_len, layout.samples_per_pixel, bps)
                }
                other => return Err(CloudError::UnsupportedPredictor(other)),
            }

            let signed = sf == sample_format::SIGNED_INT;
            Ok(values.into_iter().map(|v| integer_to_f64(v, bps, signed)).collect())
        }
        (sample_format::FLOAT, 32 | 64) => {
            if layout.predictor != predictor::NONE {
                return Err(CloudError::UnsupportedPredictor(layout.predictor));
            }
            let values: Vec<f64> = if bps == 32 {
                raw.chunks_exact(4).map(|c| order.read_f32(c) as f64).collect()
            } else {
                raw.chunks_exact(8).map(|c| order.read_f64(c)).collect()
            };
            Ok(values)
        }
        _ => Err(CloudError::UnsupportedDataType { bps, sf }),
    }
}

/// Reverse TIFF horizontal differencing, row by row, modulo the sample width.
fn undo_horizontal(values: &mut [u64], row_len: usize, stride: usize, bits: u16) {
    if row_len == 0 {
        return;
    }
    let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    for row in values.chunks_mut(row_len) {
        for i in stride..row.len() {
            row[i] = row[i].wrapping_add(row[i - stride]) & mask;
        }
    }
}

fn integer_to_f64(raw: u64, bits: u16, signed: bool) -> f64 {
    if signed {
        let shift = 64 - bits as u32;
        (((raw << shift) as i64) >> shift) as f64
    } else {
        raw as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(bps: u16, sf: u16, predictor: u16, row_len: usize) -> SampleLayout {
        SampleLayout {
            byte_order: TiffByteOrder::LittleEndian,
            bits_per_sample: bps,
            sample_format: sf,
            predictor,
            row_len,
            samples_per_pixel: 1,
        }
    }

    fn le_u16(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn uncompressed_passthrough() {
        let data = vec![1, 2, 3, 4];
        assert_eq!(decompress_tile(&data, compression::NONE, 4).unwrap(), data);
    }

    #[test]
    fn unknown_compression_rejected() {
        assert!(matches!(
            decompress_tile(&[0], 7, 1),
            Err(CloudError::UnsupportedCompression(7))
        ));
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn zlib_and_raw_deflate() {
        use std::io::Write;
        let original = le_u16(&[1200, 1300, 1250, 0]);

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(&original).unwrap();
        let compressed = zlib.finish().unwrap();
        assert_eq!(
            decompress_tile(&compressed, compression::DEFLATE, original.len()).unwrap(),
            original
        );

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        raw.write_all(&original).unwrap();
        let compressed = raw.finish().unwrap();
        assert_eq!(
            decompress_tile(&compressed, compression::ADOBE_DEFLATE, original.len()).unwrap(),
            original
        );
    }

    #[test]
    fn decode_u16_reflectance() {
        let raw = le_u16(&[100, 200, 300]);
        let out = decode_samples(&raw, &layout(16, sample_format::UNSIGNED_INT, 1, 3)).unwrap();
        assert_eq!(out, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn horizontal_predictor_is_undone_per_row() {
        // rows [10, 12, 15] and [7, 7, 1] stored as differences
        let raw = le_u16(&[10, 2, 3, 7, 0, u16::MAX - 5]);
        let out = decode_samples(&raw, &layout(16, sample_format::UNSIGNED_INT, 2, 3)).unwrap();
        assert_eq!(out, vec![10.0, 12.0, 15.0, 7.0, 7.0, 1.0]);
    }

    #[test]
    fn signed_samples_sign_extend() {
        let raw: Vec<u8> = [-5i16, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = decode_samples(&raw, &layout(16, sample_format::SIGNED_INT, 1, 2)).unwrap();
        assert_eq!(out, vec![-5.0, 7.0]);
    }

    #[test]
    fn float_samples() {
        let raw: Vec<u8> = [1.0f32, 2.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = decode_samples(&raw, &layout(32, sample_format::FLOAT, 1, 2)).unwrap();
        assert_eq!(out, vec![1.0, 2.5]);

        assert!(decode_samples(&raw, &layout(32, sample_format::FLOAT, 3, 2)).is_err());
    }

    #[test]
    fn unsupported_type_rejected() {
        assert!(matches!(
            decode_samples(&[0; 8], &layout(12, sample_format::UNSIGNED_INT, 1, 4)),
            Err(CloudError::UnsupportedDataType { bps: 12, .. })
        ));
    }
}
