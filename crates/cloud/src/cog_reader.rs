//! Core COG reader: open a remote COG and read windows by bounding box.

use std::time::Duration;

use ndarray::Array2;

use crate::cache::{TileCache, TileKey};
use crate::decompress::{self, SampleLayout};
use crate::error::{CloudError, Result};
use crate::geotiff_keys::{self, GeoTiffMeta};
use crate::http::HttpClient;
use crate::ifd::{self, tags, IfdInfo, RawIfd, TiffByteOrder};
use crate::raster::{BandWindow, GeoTransform};
use crate::reproject::Projection;
use crate::tile_index::{self, BBox, TileMapping, TileRequest};

/// Options for configuring a [`CogReader`].
#[derive(Debug, Clone)]
pub struct CogReaderOptions {
    /// Tiles kept in the LRU cache (default 64).
    pub cache_capacity: usize,
    /// Timeout per HTTP request (default 30 s).
    pub request_timeout: Duration,
    /// Retries on transient failures (default 3).
    pub max_retries: u32,
    /// Bytes fetched up front for the header and first IFDs (default 64 KiB).
    pub header_bytes: u64,
}

impl Default for CogReaderOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            header_bytes: 64 * 1024,
        }
    }
}

/// Metadata exposed by [`CogReader::metadata`].
#[derive(Debug, Clone)]
pub struct CogMetadata {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub geo_transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
    pub num_overviews: usize,
}

/// Cloud Optimized GeoTIFF reader.
///
/// Tiles are fetched on demand with HTTP Range requests, one at a time, and
/// kept decoded in an LRU cache.
pub struct CogReader {
    url: String,
    client: HttpClient,
    byte_order: TiffByteOrder,
    ifds: Vec<IfdInfo>,
    geo_meta: GeoTiffMeta,
    cache: TileCache,
}

/// Bytes already fetched from the start of the file.
struct Prefix<'a> {
    client: &'a HttpClient,
    url: &'a str,
    bytes: Vec<u8>,
    file_size: Option<u64>,
}

impl Prefix<'_> {
    /// `len` bytes at `offset`, from the prefix when it covers them.
    async fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start + len as usize;
        if end <= self.bytes.len() {
            return Ok(self.bytes[start..end].to_vec());
        }
        let len = match self.file_size {
            Some(size) if offset >= size => {
                return Err(CloudError::InvalidTiff {
                    reason: format!("offset {} beyond end of file ({} bytes)", offset, size),
                })
            }
            Some(size) => len.min(size - offset),
            None => len,
        };
        self.client.fetch_range(self.url, offset, len).await
    }

    async fn read_ifd(&self, order: TiffByteOrder, offset: u64) -> Result<RawIfd> {
        let count_bytes = self.read(offset, 2).await?;
        if count_bytes.len() < 2 {
            return Err(CloudError::InvalidTiff {
                reason: format!("IFD at {} is truncated", offset),
            });
        }
        let count = order.read_u16(&count_bytes) as usize;
        let data = self.read(offset, ifd::ifd_size(count) as u64).await?;
        ifd::parse_ifd(order, &data)
    }

    /// Out-of-line values of the `wanted` tags.
    async fn external_values(
        &self,
        order: TiffByteOrder,
        raw: &RawIfd,
        wanted: &[u16],
    ) -> Result<Vec<(u16, Vec<u8>)>> {
        let mut fetched = Vec::new();
        for entry in raw.external(wanted) {
            let bytes = self.read(entry.value_offset(order), entry.value_size()).await?;
            fetched.push((entry.tag, bytes));
        }
        Ok(fetched)
    }
}

impl CogReader {
    /// Open a remote COG by URL, reading the header and the whole IFD chain
    /// (full resolution plus overviews).
    pub async fn open(url: &str, options: CogReaderOptions) -> Result<Self> {
        let client = HttpClient::new(options.request_timeout, options.max_retries)?;

        let head = client.head(url).await?;
        if !head.accept_ranges {
            tracing::debug!("{} does not advertise Range support, trying anyway", url);
        }
        let initial = match head.content_length {
            Some(size) if size > 0 => options.header_bytes.min(size),
            _ => options.header_bytes,
        };
        let bytes = client.fetch_range(url, 0, initial).await?;

        let header = ifd::parse_header(&bytes)?;
        let order = header.byte_order;

        let (ifds, geo_meta) = {
            let prefix = Prefix {
                client: &client,
                url,
                bytes,
                file_size: head.content_length,
            };
            let mut infos = Vec::new();
            let mut geo_meta = None;
            let mut offset = header.first_ifd_offset as u64;

            while offset > 0 {
                let raw = prefix.read_ifd(order, offset).await?;
                let structure = prefix.external_values(order, &raw, &tags::STRUCTURE).await?;
                infos.push(IfdInfo::from_resolved(&raw.resolve(order, structure))?);

                if geo_meta.is_none() {
                    let geo = prefix.external_values(order, &raw, &tags::GEO).await?;
                    geo_meta = Some(geotiff_keys::extract_geotiff_meta(&raw.resolve(order, geo)));
                }
                offset = raw.next_ifd_offset as u64;
            }

            match geo_meta {
                Some(meta) => (infos, meta),
                None => return Err(CloudError::NoIfd),
            }
        };

        tracing::debug!(
            "opened {} ({}x{}, {} overviews, EPSG:{:?})",
            url,
            ifds[0].width,
            ifds[0].height,
            ifds.len() - 1,
            geo_meta.epsg
        );

        Ok(Self {
            url: url.to_string(),
            client,
            byte_order: order,
            ifds,
            geo_meta,
            cache: TileCache::new(options.cache_capacity),
        })
    }

    /// Read the window covering `bbox` (in the image CRS).
    ///
    /// `overview` of `None` reads full resolution.
    pub async fn read_window(&mut self, bbox: &BBox, overview: Option<usize>) -> Result<BandWindow> {
        let ifd_idx = overview.unwrap_or(0);
        let info = self.ifds.get(ifd_idx).cloned().ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("IFD index {} out of range (have {})", ifd_idx, self.ifds.len()),
        })?;
        let gt = self.geo_transform_for(ifd_idx);

        let mapping = tile_index::tiles_for_bbox(
            bbox,
            &gt,
            info.width,
            info.height,
            info.tile_width,
            info.tile_height,
        )
        .ok_or(CloudError::BBoxOutside)?;

        let data = self.assemble(ifd_idx, &info, &mapping).await?;
        let (min_col, min_row, _, _) = mapping.pixel_window;

        Ok(BandWindow {
            data,
            transform: gt.shifted(min_col, min_row),
            epsg: self.geo_meta.epsg,
            nodata: self.geo_meta.nodata,
        })
    }

    pub fn metadata(&self) -> CogMetadata {
        let ifd = &self.ifds[0];
        CogMetadata {
            url: self.url.clone(),
            width: ifd.width,
            height: ifd.height,
            tile_width: ifd.tile_width,
            tile_height: ifd.tile_height,
            bits_per_sample: ifd.bits_per_sample,
            sample_format: ifd.sample_format,
            compression: ifd.compression,
            geo_transform: self.geo_meta.geo_transform,
            epsg: self.geo_meta.epsg,
            nodata: self.geo_meta.nodata,
            num_overviews: self.ifds.len().saturating_sub(1),
        }
    }

    /// CRS of the image, falling back to `fallback_epsg` when the GeoKey
    /// directory carries none.
    pub fn projection(&self, fallback_epsg: Option<u32>) -> Result<Projection> {
        let epsg = self.geo_meta.epsg.or(fallback_epsg).ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("{} has no CRS", self.url),
        })?;
        Projection::from_epsg(epsg)
    }

    fn geo_transform_for(&self, ifd_idx: usize) -> GeoTransform {
        let base = self.geo_meta.geo_transform;
        if ifd_idx == 0 {
            return base;
        }
        let full = &self.ifds[0];
        let ovr = &self.ifds[ifd_idx];
        base.scaled(
            full.width as f64 / ovr.width as f64,
            full.height as f64 / ovr.height as f64,
        )
    }

    /// Fetch missing tiles in order, copying each into the window as soon as
    /// it is available.
    ///
    /// Tiles are placed before the next one is fetched, so a window spanning
    /// more tiles than the cache holds still comes back complete.
    async fn assemble(
        &mut self,
        ifd_idx: usize,
        info: &IfdInfo,
        mapping: &TileMapping,
    ) -> Result<Array2<f64>> {
        let layout = SampleLayout::for_ifd(info, self.byte_order);
        let geometry = TileGeometry {
            tile_width: info.tile_width as usize,
            tile_height: info.tile_height as usize,
            samples_per_pixel: layout.samples_per_pixel,
            pixel_window: mapping.pixel_window,
        };
        let mut output = Array2::<f64>::from_elem(mapping.output_shape, f64::NAN);

        for tr in &mapping.tiles {
            let key = TileKey {
                ifd_idx,
                tile_idx: tr.tile_idx,
            };
            if let Some(samples) = self.cache.get(&key) {
                place_tile(&mut output, samples, tr, &geometry);
                continue;
            }
            let (Some(&offset), Some(&length)) = (
                info.tile_offsets.get(tr.tile_idx),
                info.tile_byte_counts.get(tr.tile_idx),
            ) else {
                return Err(CloudError::InvalidTiff {
                    reason: format!(
                        "tile {} out of range (max {})",
                        tr.tile_idx,
                        info.tile_offsets.len()
                    ),
                });
            };
            // Sparse tile: leave its cells empty.
            if length == 0 {
                continue;
            }
            let compressed = self.client.fetch_range(&self.url, offset, length).await?;
            let raw = decompress::decompress_tile(&compressed, info.compression, info.tile_bytes())?;
            let samples = decompress::decode_samples(&raw, &layout)?;
            place_tile(&mut output, &samples, tr, &geometry);
            self.cache.insert(key, samples);
        }

        Ok(output)
    }
}

/// Tile size and the requested pixel window, in image pixels.
#[derive(Debug, Clone, Copy)]
struct TileGeometry {
    tile_width: usize,
    tile_height: usize,
    samples_per_pixel: usize,
    /// `(min_col, min_row, max_col, max_row)`, max exclusive.
    pixel_window: (usize, usize, usize, usize),
}

/// Copy the part of one decoded tile that falls inside the window.
fn place_tile(output: &mut Array2<f64>, samples: &[f64], tr: &TileRequest, g: &TileGeometry) {
    let (tw, th, spp) = (g.tile_width, g.tile_height, g.samples_per_pixel);
    let (min_col, min_row, max_col, max_row) = g.pixel_window;

    let tile_col0 = tr.tile_col * tw;
    let tile_row0 = tr.tile_row * th;
    let rows = tile_row0.max(min_row)..(tile_row0 + th).min(max_row);
    let cols = tile_col0.max(min_col)..(tile_col0 + tw).min(max_col);

    for img_row in rows {
        for img_col in cols.clone() {
            let linear = ((img_row - tile_row0) * tw + (img_col - tile_col0)) * spp;
            if let Some(&v) = samples.get(linear) {
                output[(img_row - min_row, img_col - min_col)] = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(value: f64) -> Vec<f64> {
        vec![value; 4 * 4]
    }

    #[test]
    fn window_spanning_more_tiles_than_cache_is_complete() {
        // 3 x 2 tiles of 4 x 4 pixels, window covering all of them
        let geometry = TileGeometry {
            tile_width: 4,
            tile_height: 4,
            samples_per_pixel: 1,
            pixel_window: (0, 0, 12, 8),
        };
        let requests: Vec<TileRequest> = (0..2)
            .flat_map(|tile_row| {
                (0..3).map(move |tile_col| TileRequest {
                    tile_idx: tile_row * 3 + tile_col,
                    tile_col,
                    tile_row,
                })
            })
            .collect();

        let mut cache = TileCache::new(1);
        let mut output = Array2::<f64>::from_elem((8, 12), f64::NAN);
        for tr in &requests {
            let key = TileKey {
                ifd_idx: 0,
                tile_idx: tr.tile_idx,
            };
            let samples = tile(tr.tile_idx as f64);
            place_tile(&mut output, &samples, tr, &geometry);
            cache.insert(key, samples);
        }

        assert_eq!(cache.len(), 1);
        assert!(output.iter().all(|v| !v.is_nan()));
        assert_eq!(output[(0, 0)], 0.0);
        assert_eq!(output[(7, 11)], 5.0);
        assert_eq!(output[(5, 6)], 4.0);
    }

    #[test]
    fn partial_tile_is_clipped_to_window() {
        let geometry = TileGeometry {
            tile_width: 4,
            tile_height: 4,
            samples_per_pixel: 1,
            pixel_window: (2, 1, 6, 3),
        };
        let samples: Vec<f64> = (0..16).map(f64::from).collect();
        let mut output = Array2::<f64>::from_elem((2, 4), f64::NAN);
        let first = TileRequest {
            tile_idx: 0,
            tile_col: 0,
            tile_row: 0,
        };
        place_tile(&mut output, &samples, &first, &geometry);

        // row 1, cols 2..4 of the tile land in the first two output columns
        assert_eq!(output[(0, 0)], 6.0);
        assert_eq!(output[(1, 1)], 11.0);
        assert!(output[(0, 2)].is_nan());
    }
}
