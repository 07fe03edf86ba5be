//! TIFF IFD (Image File Directory) parsing for COG files.
//!
//! Works on byte slices fetched with HTTP Range requests rather than a
//! `Read + Seek` source. Classic TIFF only; BigTIFF is rejected.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CloudError, Result};

/// Byte order of the TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

impl TiffByteOrder {
    pub fn read_u16(self, data: &[u8]) -> u16 {
        match self {
            Self::LittleEndian => LittleEndian::read_u16(data),
            Self::BigEndian => BigEndian::read_u16(data),
        }
    }

    pub fn read_i16(self, data: &[u8]) -> i16 {
        match self {
            Self::LittleEndian => LittleEndian::read_i16(data),
            Self::BigEndian => BigEndian::read_i16(data),
        }
    }

    pub fn read_u32(self, data: &[u8]) -> u32 {
        match self {
            Self::LittleEndian => LittleEndian::read_u32(data),
            Self::BigEndian => BigEndian::read_u32(data),
        }
    }

    pub fn read_i32(self, data: &[u8]) -> i32 {
        match self {
            Self::LittleEndian => LittleEndian::read_i32(data),
            Self::BigEndian => BigEndian::read_i32(data),
        }
    }

    pub fn read_u64(self, data: &[u8]) -> u64 {
        match self {
            Self::LittleEndian => LittleEndian::read_u64(data),
            Self::BigEndian => BigEndian::read_u64(data),
        }
    }

    pub fn read_f32(self, data: &[u8]) -> f32 {
        match self {
            Self::LittleEndian => LittleEndian::read_f32(data),
            Self::BigEndian => BigEndian::read_f32(data),
        }
    }

    pub fn read_f64(self, data: &[u8]) -> f64 {
        match self {
            Self::LittleEndian => LittleEndian::read_f64(data),
            Self::BigEndian => BigEndian::read_f64(data),
        }
    }
}

/// Well-known TIFF tag IDs.
pub mod tags {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GDAL_NODATA: u16 = 42113;

    /// Tags describing the tile layout of one IFD.
    pub const STRUCTURE: [u16; 12] = [
        IMAGE_WIDTH,
        IMAGE_LENGTH,
        BITS_PER_SAMPLE,
        COMPRESSION,
        SAMPLES_PER_PIXEL,
        PLANAR_CONFIG,
        PREDICTOR,
        TILE_WIDTH,
        TILE_LENGTH,
        TILE_OFFSETS,
        TILE_BYTE_COUNTS,
        SAMPLE_FORMAT,
    ];

    /// GeoTIFF tags, read from the full-resolution IFD only.
    pub const GEO: [u16; 5] = [
        MODEL_PIXEL_SCALE,
        MODEL_TIEPOINT,
        MODEL_TRANSFORMATION,
        GEO_KEY_DIRECTORY,
        GDAL_NODATA,
    ];
}

/// Byte size of one value of a TIFF field type.
fn type_byte_size(type_id: u16) -> usize {
    match type_id {
        3 | 8 => 2,
        4 | 9 | 11 => 4,
        5 | 10 | 12 | 16 => 8,
        _ => 1,
    }
}

/// Parsed 8-byte TIFF header.
#[derive(Debug, Clone, Copy)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u32,
}

/// One 12-byte IFD entry before its value is resolved.
#[derive(Debug, Clone)]
pub struct TagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u32,
    /// The last 4 bytes of the entry, in file byte order.
    pub value_field: [u8; 4],
}

impl TagEntry {
    /// Total size of the value in bytes.
    pub fn value_size(&self) -> u64 {
        type_byte_size(self.type_id) as u64 * self.count as u64
    }

    /// Values of 4 bytes or fewer are stored in the entry itself.
    pub fn is_inline(&self) -> bool {
        self.value_size() <= 4
    }

    /// File offset of an out-of-line value.
    pub fn value_offset(&self, order: TiffByteOrder) -> u64 {
        order.read_u32(&self.value_field) as u64
    }

    fn inline_bytes(&self) -> Vec<u8> {
        self.value_field[..self.value_size() as usize].to_vec()
    }
}

/// A raw IFD: its entries and the offset of the next IFD (0 = last).
#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<TagEntry>,
    pub next_ifd_offset: u32,
}

impl RawIfd {
    /// Entries whose values live elsewhere in the file, restricted to `wanted`.
    pub fn external<'a>(&'a self, wanted: &'a [u16]) -> impl Iterator<Item = &'a TagEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| wanted.contains(&e.tag) && !e.is_inline())
    }

    /// Attach value bytes to the entries: inline values are taken from the
    /// entry, external ones looked up in `fetched` by tag. External entries
    /// without fetched bytes are dropped.
    pub fn resolve(&self, order: TiffByteOrder, fetched: Vec<(u16, Vec<u8>)>) -> ResolvedIfd {
        let mut tags: Vec<(TagEntry, Vec<u8>)> = Vec::with_capacity(self.entries.len());
        let mut fetched = fetched;
        for entry in &self.entries {
            if entry.is_inline() {
                tags.push((entry.clone(), entry.inline_bytes()));
            } else if let Some(pos) = fetched.iter().position(|(t, _)| *t == entry.tag) {
                let (_, bytes) = fetched.swap_remove(pos);
                tags.push((entry.clone(), bytes));
            }
        }
        ResolvedIfd { order, tags }
    }
}

/// IFD entries paired with their value bytes.
#[derive(Debug, Clone)]
pub struct ResolvedIfd {
    order: TiffByteOrder,
    tags: Vec<(TagEntry, Vec<u8>)>,
}

impl ResolvedIfd {
    pub fn byte_order(&self) -> TiffByteOrder {
        self.order
    }

    fn find(&self, tag: u16) -> Option<&(TagEntry, Vec<u8>)> {
        self.tags.iter().find(|(e, _)| e.tag == tag)
    }

    /// Integer values (BYTE, SHORT, LONG, LONG8) widened to u64.
    pub fn u64_values(&self, tag: u16) -> Vec<u64> {
        let Some((entry, data)) = self.find(tag) else {
            return Vec::new();
        };
        let size = type_byte_size(entry.type_id);
        data.chunks_exact(size)
            .take(entry.count as usize)
            .filter_map(|chunk| match entry.type_id {
                1 => Some(chunk[0] as u64),
                3 => Some(self.order.read_u16(chunk) as u64),
                4 => Some(self.order.read_u32(chunk) as u64),
                16 => Some(self.order.read_u64(chunk)),
                _ => None,
            })
            .collect()
    }

    /// Floating-point values (FLOAT, DOUBLE) widened to f64.
    pub fn f64_values(&self, tag: u16) -> Vec<f64> {
        let Some((entry, data)) = self.find(tag) else {
            return Vec::new();
        };
        let size = type_byte_size(entry.type_id);
        data.chunks_exact(size)
            .take(entry.count as usize)
            .filter_map(|chunk| match entry.type_id {
                11 => Some(self.order.read_f32(chunk) as f64),
                12 => Some(self.order.read_f64(chunk)),
                _ => None,
            })
            .collect()
    }

    /// NUL-terminated ASCII value.
    pub fn ascii(&self, tag: u16) -> Option<String> {
        let (_, data) = self.find(tag)?;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Some(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    pub fn u64_value(&self, tag: u16) -> Option<u64> {
        self.u64_values(tag).first().copied()
    }
}

/// Layout of one image (full resolution or overview) in a COG.
#[derive(Debug, Clone)]
pub struct IfdInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
    pub samples_per_pixel: u16,
    pub planar_config: u16,
}

impl IfdInfo {
    pub fn from_resolved(ifd: &ResolvedIfd) -> Result<Self> {
        let get = |tag: u16, default: u64| ifd.u64_value(tag).unwrap_or(default);

        let width = get(tags::IMAGE_WIDTH, 0) as u32;
        let height = get(tags::IMAGE_LENGTH, 0) as u32;
        if width == 0 || height == 0 {
            return Err(CloudError::InvalidTiff {
                reason: "missing image dimensions".into(),
            });
        }

        let tile_offsets = ifd.u64_values(tags::TILE_OFFSETS);
        let tile_byte_counts = ifd.u64_values(tags::TILE_BYTE_COUNTS);
        if tile_offsets.is_empty() || tile_offsets.len() != tile_byte_counts.len() {
            return Err(CloudError::InvalidTiff {
                reason: format!(
                    "tile offsets ({}) and byte counts ({}) disagree, or image is not tiled",
                    tile_offsets.len(),
                    tile_byte_counts.len()
                ),
            });
        }

        let info = Self {
            width,
            height,
            tile_width: get(tags::TILE_WIDTH, width as u64) as u32,
            tile_height: get(tags::TILE_LENGTH, height as u64) as u32,
            tile_offsets,
            tile_byte_counts,
            bits_per_sample: get(tags::BITS_PER_SAMPLE, 8) as u16,
            sample_format: get(tags::SAMPLE_FORMAT, 1) as u16,
            compression: get(tags::COMPRESSION, 1) as u16,
            predictor: get(tags::PREDICTOR, 1) as u16,
            samples_per_pixel: get(tags::SAMPLES_PER_PIXEL, 1) as u16,
            planar_config: get(tags::PLANAR_CONFIG, 1) as u16,
        };

        if info.samples_per_pixel > 1 && info.planar_config != 1 {
            return Err(CloudError::UnsupportedPlanarConfig(info.planar_config));
        }
        Ok(info)
    }

    /// Tile grid dimensions `(across, down)`.
    pub fn tile_grid(&self) -> (usize, usize) {
        let tw = self.tile_width as usize;
        let th = self.tile_height as usize;
        (
            (self.width as usize).div_ceil(tw),
            (self.height as usize).div_ceil(th),
        )
    }

    /// Decoded size of one tile in bytes.
    pub fn tile_bytes(&self) -> usize {
        self.tile_width as usize
            * self.tile_height as usize
            * self.samples_per_pixel as usize
            * (self.bits_per_sample as usize).div_ceil(8)
    }
}

/// Parse the 8-byte TIFF header.
pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < 8 {
        return Err(CloudError::InvalidTiff {
            reason: "header too short".into(),
        });
    }

    let byte_order = match (data[0], data[1]) {
        (b'I', b'I') => TiffByteOrder::LittleEndian,
        (b'M', b'M') => TiffByteOrder::BigEndian,
        _ => {
            return Err(CloudError::InvalidTiff {
                reason: "invalid byte order marker".into(),
            });
        }
    };

    match byte_order.read_u16(&data[2..4]) {
        42 => {}
        43 => {
            return Err(CloudError::InvalidTiff {
                reason: "BigTIFF is not supported".into(),
            });
        }
        magic => {
            return Err(CloudError::InvalidTiff {
                reason: format!("expected magic 42, got {}", magic),
            });
        }
    }

    Ok(TiffHeader {
        byte_order,
        first_ifd_offset: byte_order.read_u32(&data[4..8]),
    })
}

/// Bytes needed to parse an IFD with `entry_count` entries.
pub fn ifd_size(entry_count: usize) -> usize {
    2 + entry_count * 12 + 4
}

/// Parse one IFD. `data` must start at the IFD offset.
pub fn parse_ifd(order: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    if data.len() < 2 {
        return Err(CloudError::InvalidTiff {
            reason: "IFD too short".into(),
        });
    }

    let entry_count = order.read_u16(&data[0..2]) as usize;
    let needed = ifd_size(entry_count);
    if data.len() < needed {
        return Err(CloudError::InvalidTiff {
            reason: format!("IFD needs {} bytes but only {} available", needed, data.len()),
        });
    }

    let entries = data[2..2 + entry_count * 12]
        .chunks_exact(12)
        .map(|raw| TagEntry {
            tag: order.read_u16(&raw[0..2]),
            type_id: order.read_u16(&raw[2..4]),
            count: order.read_u32(&raw[4..8]),
            value_field: [raw[8], raw[9], raw[10], raw[11]],
        })
        .collect();

    let next = &data[needed - 4..needed];
    Ok(RawIfd {
        entries,
        next_ifd_offset: order.read_u32(next),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Little-endian IFD with the given `(tag, type, count, value)` entries.
    pub(crate) fn le_ifd(entries: &[(u16, u16, u32, u32)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for &(tag, type_id, count, value) in entries {
            data.extend_from_slice(&tag.to_le_bytes());
            data.extend_from_slice(&type_id.to_le_bytes());
            data.extend_from_slice(&count.to_le_bytes());
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.extend_from_slice(&0u32.to_le_bytes());
        data
    }

    #[test]
    fn header_both_byte_orders() {
        let header = parse_header(&[b'I', b'I', 42, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(header.byte_order, TiffByteOrder::LittleEndian);
        assert_eq!(header.first_ifd_offset, 8);

        let header = parse_header(&[b'M', b'M', 0, 42, 0, 0, 0, 8]).unwrap();
        assert_eq!(header.byte_order, TiffByteOrder::BigEndian);
        assert_eq!(header.first_ifd_offset, 8);
    }

    #[test]
    fn header_rejects_bigtiff() {
        let err = parse_header(&[b'I', b'I', 43, 0, 8, 0, 0, 0]).unwrap_err();
        assert!(err.to_string().contains("BigTIFF"));
    }

    #[test]
    fn inline_short_is_read_from_entry() {
        let data = le_ifd(&[(tags::IMAGE_WIDTH, 3, 1, 512)]);
        let raw = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        assert_eq!(raw.entries.len(), 1);
        assert!(raw.entries[0].is_inline());
        assert_eq!(raw.next_ifd_offset, 0);

        let resolved = raw.resolve(TiffByteOrder::LittleEndian, Vec::new());
        assert_eq!(resolved.u64_value(tags::IMAGE_WIDTH), Some(512));
    }

    #[test]
    fn big_endian_inline_short() {
        // tag 256, SHORT, count 1, value 0x0200 left-justified
        let mut data = vec![0, 1];
        data.extend_from_slice(&[0x01, 0x00, 0x00, 0x03, 0, 0, 0, 1, 0x02, 0x00, 0, 0]);
        data.extend_from_slice(&[0, 0, 0, 0]);
        let raw = parse_ifd(TiffByteOrder::BigEndian, &data).unwrap();
        let resolved = raw.resolve(TiffByteOrder::BigEndian, Vec::new());
        assert_eq!(resolved.u64_value(tags::IMAGE_WIDTH), Some(512));
    }

    #[test]
    fn external_values_are_attached_by_tag() {
        let data = le_ifd(&[
            (tags::IMAGE_WIDTH, 3, 1, 1024),
            (tags::IMAGE_LENGTH, 3, 1, 512),
            (tags::TILE_WIDTH, 3, 1, 512),
            (tags::TILE_LENGTH, 3, 1, 512),
            (tags::TILE_OFFSETS, 4, 2, 4000),
            (tags::TILE_BYTE_COUNTS, 4, 2, 4008),
        ]);
        let raw = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let external: Vec<u16> = raw.external(&tags::STRUCTURE).map(|e| e.tag).collect();
        assert_eq!(external, vec![tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS]);
        assert_eq!(raw.entries[4].value_offset(TiffByteOrder::LittleEndian), 4000);

        let le = |vals: &[u32]| vals.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>();
        let resolved = raw.resolve(
            TiffByteOrder::LittleEndian,
            vec![
                (tags::TILE_OFFSETS, le(&[100, 900])),
                (tags::TILE_BYTE_COUNTS, le(&[800, 700])),
            ],
        );
        let info = IfdInfo::from_resolved(&resolved).unwrap();
        assert_eq!(info.tile_offsets, vec![100, 900]);
        assert_eq!(info.tile_byte_counts, vec![800, 700]);
        assert_eq!(info.tile_grid(), (2, 1));
        assert_eq!(info.predictor, 1);
        assert_eq!(info.tile_bytes(), 512 * 512);
    }

    #[test]
    fn untiled_image_is_rejected() {
        let data = le_ifd(&[(tags::IMAGE_WIDTH, 3, 1, 10), (tags::IMAGE_LENGTH, 3, 1, 10)]);
        let raw = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let resolved = raw.resolve(TiffByteOrder::LittleEndian, Vec::new());
        assert!(IfdInfo::from_resolved(&resolved).is_err());
    }

    #[test]
    fn truncated_ifd_is_an_error() {
        let mut data = le_ifd(&[(tags::IMAGE_WIDTH, 3, 1, 512)]);
        data.truncate(10);
        assert!(parse_ifd(TiffByteOrder::LittleEndian, &data).is_err());
    }
}
