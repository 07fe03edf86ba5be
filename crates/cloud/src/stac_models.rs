//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (`POST /search`) covering what the
//! Sentinel-2 source needs: bbox, datetime, collection and cloud-cover
//! filtering, pagination via `links`, projection metadata and band assets.

use std::collections::HashMap;

use mugimap_core::{ObservationDate, Scene};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// STAC query extension, e.g. `{"eo:cloud_cover": {"lt": 50}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[west, south, east, north]` in WGS84 degrees.
    pub fn bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox.to_vec());
        self
    }

    /// Datetime or interval, e.g. `"2025-12-01T00:00:00Z/2026-01-01T00:00:00Z"`.
    pub fn datetime(mut self, dt: impl Into<String>) -> Self {
        self.datetime = Some(dt.into());
        self
    }

    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Keep only scenes with `eo:cloud_cover` strictly below `percent`.
    pub fn max_cloud_cover(mut self, percent: f64) -> Self {
        let filter = json!({ "eo:cloud_cover": { "lt": percent } });
        match self.query.as_mut().and_then(Value::as_object_mut) {
            Some(existing) => {
                existing.insert("eo:cloud_cover".into(), filter["eo:cloud_cover"].clone());
            }
            None => self.query = Some(filter),
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,
}

impl StacItemCollection {
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (one Sentinel-2 granule).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    /// e.g. `S2B_52SGE_20251214_0_L2A`.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// EPSG code from `proj:epsg`, or from `proj:code` (`"EPSG:32652"`) as
    /// written by newer catalogs.
    pub fn epsg(&self) -> Option<u32> {
        let extra = &self.properties.extra;
        if let Some(code) = extra.get("proj:epsg").and_then(Value::as_u64) {
            return u32::try_from(code).ok();
        }
        extra
            .get("proj:code")
            .and_then(Value::as_str)
            .and_then(|s| s.strip_prefix("EPSG:"))
            .and_then(|s| s.parse().ok())
    }

    /// Acquisition date from `properties.datetime`.
    pub fn observation_date(&self) -> mugimap_core::Result<ObservationDate> {
        match self.properties.datetime.as_deref() {
            Some(dt) => dt.parse(),
            None => Err(mugimap_core::Error::InvalidDate {
                value: self.id.clone(),
                reason: "item has no datetime".into(),
            }),
        }
    }

    pub fn to_scene(&self) -> mugimap_core::Result<Scene> {
        Ok(Scene {
            date: self.observation_date()?,
            source_id: self.id.clone(),
            cloud_cover: self.properties.eo_cloud_cover,
        })
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Everything not modelled explicitly (projection extension etc.).
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl StacAsset {
    /// `(scale, offset)` from the raster extension, when present.
    pub fn raster_scaling(&self) -> Option<(f64, f64)> {
        let band = self.extra.get("raster:bands")?.as_array()?.first()?;
        let scale = band.get("scale").and_then(Value::as_f64).unwrap_or(1.0);
        let offset = band.get("offset").and_then(Value::as_f64).unwrap_or(0.0);
        Some((scale, offset))
    }
}

/// A STAC Link (used for pagination).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    pub rel: String,

    pub href: String,

    /// `"next"` links on POST searches usually say `POST`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Merge `body` into the previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}
