//! Sentinel-2 L2A imagery source.
//!
//! Scenes come from a STAC search; field pixels are sampled from the band
//! COGs of the chosen scene. Each sample point sits on a `pixel_scale` grid
//! in the scene's UTM zone, is kept only if its centre lies inside the field
//! polygon and its SCL class passes the cloud mask, and carries the three
//! indices computed from surface reflectance.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use geo::Contains;
use geo_types::{Point, Polygon};
use mugimap_algorithms::imagery::{BandSample, CloudMask, ReflectanceScale};
use mugimap_core::{DateWindow, FieldTarget, ImagerySource, PixelRecord, Region, Scene};

use crate::cog_reader::{CogReader, CogReaderOptions};
use crate::error::{CloudError, Result};
use crate::raster::BandWindow;
use crate::reproject::Projection;
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::{StacAsset, StacItem, StacSearchParams};
use crate::tile_index::BBox;

/// STAC collection searched for scenes.
pub const COLLECTION: &str = "sentinel-2-l2a";

/// Bands read for every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Green,
    Red,
    Nir,
    Swir16,
    Scl,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Green, Band::Red, Band::Nir, Band::Swir16, Band::Scl];

    /// Asset keys used by Earth Search and by Planetary Computer.
    pub fn asset_keys(&self) -> [&'static str; 2] {
        match self {
            Band::Green => ["green", "B03"],
            Band::Red => ["red", "B04"],
            Band::Nir => ["nir", "B08"],
            Band::Swir16 => ["swir16", "B11"],
            Band::Scl => ["scl", "SCL"],
        }
    }

    pub fn asset<'a>(&self, item: &'a StacItem) -> Result<&'a StacAsset> {
        let keys = self.asset_keys();
        keys.iter()
            .find_map(|k| item.asset(k))
            .ok_or_else(|| CloudError::MissingAsset {
                item: item.id.clone(),
                asset: keys[0].to_string(),
            })
    }
}

/// Configuration for [`Sentinel2Source`].
#[derive(Debug, Clone)]
pub struct Sentinel2Options {
    pub catalog: StacCatalog,
    /// Scenes with `eo:cloud_cover` at or above this percentage are ignored.
    pub cloud_threshold: f64,
    /// Sampling grid spacing in metres.
    pub pixel_scale: f64,
    pub mask: CloudMask,
    pub stac: StacClientOptions,
    pub cog: CogReaderOptions,
}

impl Default for Sentinel2Options {
    fn default() -> Self {
        Self {
            catalog: StacCatalog::default(),
            cloud_threshold: 50.0,
            pixel_scale: 10.0,
            mask: CloudMask::default(),
            stac: StacClientOptions::default(),
            cog: CogReaderOptions::default(),
        }
    }
}

/// Blocking [`ImagerySource`] backed by a STAC catalog.
///
/// Owns a current-thread Tokio runtime; every remote call is driven to
/// completion before the method returns.
pub struct Sentinel2Source {
    runtime: tokio::runtime::Runtime,
    client: StacClient,
    options: Sentinel2Options,
    /// Items seen by the last search, by id.
    items: HashMap<String, StacItem>,
    /// Open readers of the scene being sampled, by unsigned href.
    readers: HashMap<String, CogReader>,
    current_scene: Option<String>,
}

impl Sentinel2Source {
    pub fn new(options: Sentinel2Options) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = StacClient::new(options.catalog.clone(), options.stac.clone())?;

        Ok(Self {
            runtime,
            client,
            options,
            items: HashMap::new(),
            readers: HashMap::new(),
            current_scene: None,
        })
    }

    pub fn options(&self) -> &Sentinel2Options {
        &self.options
    }

    /// Search the catalog (blocking).
    pub fn search(&mut self, region: &Region, window: &DateWindow) -> Result<Vec<Scene>> {
        let params = StacSearchParams::new()
            .bbox(region.bbox())
            .datetime(window.to_interval())
            .collections(&[COLLECTION])
            .limit(self.client.options().page_size)
            .max_cloud_cover(self.options.cloud_threshold);

        let found = self.runtime.block_on(self.client.search_all(&params))?;
        self.items.clear();

        let mut scenes = Vec::with_capacity(found.len());
        for item in found {
            match item.to_scene() {
                Ok(scene) if window.contains(scene.date) => {
                    self.items.insert(item.id.clone(), item);
                    scenes.push(scene);
                }
                Ok(scene) => {
                    tracing::debug!("{} ({}) falls outside the search window", scene.source_id, scene.date);
                }
                Err(e) => tracing::warn!("skipping item {}: {}", item.id, e),
            }
        }

        tracing::info!("{} scenes below {}% cloud cover", scenes.len(), self.options.cloud_threshold);
        Ok(scenes)
    }

    /// Sample one field from one scene (blocking).
    pub fn sample(&mut self, scene: &Scene, field: &FieldTarget) -> Result<Vec<PixelRecord>> {
        let item = self
            .items
            .get(&scene.source_id)
            .cloned()
            .ok_or_else(|| CloudError::UnknownScene(scene.source_id.clone()))?;

        if self.current_scene.as_deref() != Some(item.id.as_str()) {
            self.readers.clear();
            self.current_scene = Some(item.id.clone());
        }

        let Self {
            runtime,
            client,
            options,
            readers,
            ..
        } = self;
        runtime.block_on(sample_item(client, options, readers, &item, field))
    }
}

impl ImagerySource for Sentinel2Source {
    fn list_scenes(&mut self, region: &Region, window: &DateWindow) -> mugimap_core::Result<Vec<Scene>> {
        Ok(self.search(region, window)?)
    }

    fn sample_field(&mut self, scene: &Scene, field: &FieldTarget) -> mugimap_core::Result<Vec<PixelRecord>> {
        Ok(self.sample(scene, field)?)
    }
}

/// Band windows around one field, all in the scene CRS.
pub struct FieldWindows {
    pub green: BandWindow,
    pub red: BandWindow,
    pub nir: BandWindow,
    pub swir16: BandWindow,
    pub scl: BandWindow,
}

/// DN to reflectance conversion per spectral band.
#[derive(Debug, Clone, Copy)]
pub struct BandScales {
    pub green: ReflectanceScale,
    pub red: ReflectanceScale,
    pub nir: ReflectanceScale,
    pub swir16: ReflectanceScale,
}

impl Default for BandScales {
    fn default() -> Self {
        let s = ReflectanceScale::default();
        Self {
            green: s,
            red: s,
            nir: s,
            swir16: s,
        }
    }
}

impl BandScales {
    /// From the assets' raster extension, defaulting per band.
    pub fn for_item(item: &StacItem) -> Self {
        let scale = |band: Band| {
            band.asset(item)
                .ok()
                .and_then(|a| a.raster_scaling())
                .map(|(scale, offset)| ReflectanceScale {
                    scale,
                    offset,
                    ..ReflectanceScale::default()
                })
                .unwrap_or_default()
        };
        Self {
            green: scale(Band::Green),
            red: scale(Band::Red),
            nir: scale(Band::Nir),
            swir16: scale(Band::Swir16),
        }
    }
}

async fn sample_item(
    client: &StacClient,
    options: &Sentinel2Options,
    readers: &mut HashMap<String, CogReader>,
    item: &StacItem,
    field: &FieldTarget,
) -> Result<Vec<PixelRecord>> {
    let Some(rect) = field.bounding_rect() else {
        return Ok(Vec::new());
    };
    let lonlat = BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);

    let projection = reader_for(client, &options.cog, readers, item, Band::Nir)
        .await?
        .projection(item.epsg())?;
    // One 20 m pixel of slack on each side for the SWIR and SCL bands.
    let bbox = projection.project_bbox(&lonlat).expand(options.pixel_scale.max(20.0));

    let mut windows = Vec::with_capacity(Band::ALL.len());
    for band in Band::ALL {
        let reader = reader_for(client, &options.cog, readers, item, band).await?;
        match reader.read_window(&bbox, None).await {
            Ok(window) => windows.push(window),
            Err(CloudError::BBoxOutside) => {
                tracing::debug!("{} lies outside {}", field.polygon_uu, item.id);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }
    }

    let mut it = windows.into_iter();
    let (Some(green), Some(red), Some(nir), Some(swir16), Some(scl)) =
        (it.next(), it.next(), it.next(), it.next(), it.next())
    else {
        return Ok(Vec::new());
    };
    let windows = FieldWindows {
        green,
        red,
        nir,
        swir16,
        scl,
    };

    Ok(sample_windows(
        &windows,
        projection,
        &field.polygon,
        &options.mask,
        &BandScales::for_item(item),
        options.pixel_scale,
    ))
}

async fn reader_for<'r>(
    client: &StacClient,
    cog: &CogReaderOptions,
    readers: &'r mut HashMap<String, CogReader>,
    item: &StacItem,
    band: Band,
) -> Result<&'r mut CogReader> {
    let href = band.asset(item)?.href.clone();
    match readers.entry(href) {
        Entry::Occupied(e) => Ok(e.into_mut()),
        Entry::Vacant(e) => {
            let signed = client.sign_asset_href(e.key()).await?;
            let reader = CogReader::open(&signed, cog.clone()).await?;
            Ok(e.insert(reader))
        }
    }
}

/// Sample points on a `step`-metre grid aligned to multiples of `step`,
/// as (x, y) cell centres covering `bbox`, north to south.
fn grid_points(bbox: &BBox, step: f64) -> impl Iterator<Item = (f64, f64)> {
    let x0 = (bbox.min_x / step).floor() * step + step / 2.0;
    let y0 = (bbox.max_y / step).ceil() * step - step / 2.0;
    let cols = ((bbox.max_x - x0) / step).ceil().max(0.0) as usize;
    let rows = ((y0 - bbox.min_y) / step).ceil().max(0.0) as usize;
    (0..rows).flat_map(move |r| (0..cols).map(move |c| (x0 + c as f64 * step, y0 - r as f64 * step)))
}

/// Clear-sky pixels of `polygon` from already fetched band windows.
pub fn sample_windows(
    windows: &FieldWindows,
    projection: Projection,
    polygon: &Polygon<f64>,
    mask: &CloudMask,
    scales: &BandScales,
    step: f64,
) -> Vec<PixelRecord> {
    let (rows, cols) = windows.nir.shape();
    let bounds = windows.nir.transform.bounds(cols, rows);
    let bbox = BBox::new(bounds.0, bounds.1, bounds.2, bounds.3);

    let reflectance = |window: &BandWindow, scale: &ReflectanceScale, x: f64, y: f64| {
        window.value_at(x, y).and_then(|dn| scale.apply(dn))
    };

    grid_points(&bbox, step)
        .filter_map(|(x, y)| {
            let (lon, lat) = projection.inverse(x, y);
            if !polygon.contains(&Point::new(lon, lat)) {
                return None;
            }
            let scl = windows.scl.value_at(x, y)?;
            if !mask.is_clear(scl) {
                return None;
            }
            let sample = BandSample {
                green: reflectance(&windows.green, &scales.green, x, y)?,
                red: reflectance(&windows.red, &scales.red, x, y)?,
                nir: reflectance(&windows.nir, &scales.nir, x, y)?,
                swir16: reflectance(&windows.swir16, &scales.swir16, x, y)?,
            };
            let values = sample.indices();
            Some(PixelRecord {
                lat,
                lon,
                ndvi: values.ndvi,
                ndwi: values.ndwi,
                gndvi: values.gndvi,
            })
        })
        .collect()
}
