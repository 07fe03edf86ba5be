//! The imagery source seam.
//!
//! The sync engine only needs two things from a satellite archive: which
//! scenes cover the region in a date window, and the per-pixel indices of one
//! scene inside one field. Remote catalogs implement [`ImagerySource`]; tests
//! use an in-memory fake.

use std::collections::BTreeMap;

use geo_types::Rect;

use crate::date::{DateWindow, ObservationDate};
use crate::error::{Error, Result};
use crate::field::{targets_bounds, FieldTarget};
use crate::record::PixelRecord;

/// One acquisition returned by a catalog search.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub date: ObservationDate,
    /// Catalog identifier, e.g. `S2B_52SGE_20251214_0_L2A`.
    pub source_id: String,
    /// Scene-level cloud cover in percent, when the catalog reports it.
    pub cloud_cover: Option<f64>,
}

/// Search region in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Region {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        let ok = [min_lon, min_lat, max_lon, max_lat].iter().all(|v| v.is_finite())
            && min_lon <= max_lon
            && min_lat <= max_lat;
        if !ok {
            return Err(Error::InvalidParameter {
                name: "region",
                value: format!("[{min_lon}, {min_lat}, {max_lon}, {max_lat}]"),
                reason: "expected finite [min_lon, min_lat, max_lon, max_lat]".into(),
            });
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Bounding box of all target fields.
    pub fn from_targets(targets: &[FieldTarget]) -> Result<Self> {
        let rect = targets_bounds(targets).ok_or_else(|| Error::InvalidParameter {
            name: "region",
            value: "[]".into(),
            reason: "no target fields".into(),
        })?;
        Ok(Self::from(rect))
    }

    /// `[west, south, east, north]`
    pub fn bbox(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// Mean of the four corners as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

impl From<Rect<f64>> for Region {
    fn from(r: Rect<f64>) -> Self {
        Self {
            min_lon: r.min().x,
            min_lat: r.min().y,
            max_lon: r.max().x,
            max_lat: r.max().y,
        }
    }
}

/// A satellite archive that can be searched and sampled.
pub trait ImagerySource {
    /// Scenes intersecting `region` acquired within `window`.
    fn list_scenes(&mut self, region: &Region, window: &DateWindow) -> Result<Vec<Scene>>;

    /// Cloud-masked index values for every pixel centre inside `field`.
    ///
    /// An empty vector means the field had no usable pixels on this scene.
    fn sample_field(&mut self, scene: &Scene, field: &FieldTarget) -> Result<Vec<PixelRecord>>;
}

impl<S: ImagerySource + ?Sized> ImagerySource for &mut S {
    fn list_scenes(&mut self, region: &Region, window: &DateWindow) -> Result<Vec<Scene>> {
        (**self).list_scenes(region, window)
    }

    fn sample_field(&mut self, scene: &Scene, field: &FieldTarget) -> Result<Vec<PixelRecord>> {
        (**self).sample_field(scene, field)
    }
}

/// One scene per date: the least cloudy, first seen on ties.
///
/// Scenes without a cloud cover rank after those with one.
pub fn best_scene_per_date(scenes: impl IntoIterator<Item = Scene>) -> BTreeMap<ObservationDate, Scene> {
    let rank = |s: &Scene| s.cloud_cover.unwrap_or(f64::INFINITY);
    let mut best: BTreeMap<ObservationDate, Scene> = BTreeMap::new();
    for scene in scenes {
        match best.get(&scene.date) {
            Some(kept) if rank(kept) <= rank(&scene) => {}
            _ => {
                best.insert(scene.date, scene);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scene(date: &str, id: &str, cloud: Option<f64>) -> Scene {
        Scene {
            date: date.parse().unwrap(),
            source_id: id.into(),
            cloud_cover: cloud,
        }
    }

    #[test]
    fn least_cloudy_scene_wins() {
        let best = best_scene_per_date(vec![
            scene("2025-12-14", "a", Some(30.0)),
            scene("2025-12-14", "b", Some(12.5)),
            scene("2025-12-14", "c", Some(12.5)),
            scene("2025-12-02", "d", None),
            scene("2025-12-02", "e", Some(49.0)),
        ]);
        let ids: Vec<&str> = best.values().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["e", "b"]);
    }

    #[test]
    fn region_center_is_mean_of_corners() {
        let r = Region::new(131.0, 33.0, 131.02, 33.01).unwrap();
        let (lat, lon) = r.center();
        assert_relative_eq!(lat, 33.005, epsilon = 1e-12);
        assert_relative_eq!(lon, 131.01, epsilon = 1e-12);
        assert!(Region::new(131.1, 33.0, 131.0, 33.1).is_err());
    }
}
