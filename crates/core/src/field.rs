//! Target fields: the field table joined with the boundary polygons.
//!
//! The field table is a CSV export of the field list with at least the
//! `polygon_uu` and `address` columns. Boundaries come from a GeoJSON
//! `FeatureCollection` whose features carry a `polygon_uu` property.
//! Only boundary features listed in the table are targeted, and only
//! `Polygon` geometries are kept.

use std::collections::HashMap;
use std::path::Path;

use geo_types::{Coord, LineString, Polygon, Rect};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::io::read_json;

/// Address used when the table has no address for a field.
pub const UNKNOWN_ADDRESS: &str = "不明";

/// One row of the field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub polygon_uu: String,
    pub address: Option<String>,
}

/// The field table, in file order.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    rows: Vec<FieldRow>,
    index: HashMap<String, usize>,
}

impl FieldTable {
    pub fn from_rows(rows: Vec<FieldRow>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            // first row wins on duplicate identifiers
            index.entry(row.polygon_uu.clone()).or_insert(i);
        }
        Self { rows, index }
    }

    /// Read the table from a CSV file with a header row.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let reader = csv::Reader::from_path(path.as_ref())?;
        Self::from_csv_reader(reader)
    }

    pub fn from_csv_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}') == name)
                .ok_or(Error::MissingColumn(name))
        };
        let id_col = column("polygon_uu")?;
        let address_col = column("address")?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let Some(id) = record.get(id_col).map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let address = record
                .get(address_col)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            rows.push(FieldRow {
                polygon_uu: id.to_string(),
                address,
            });
        }
        tracing::debug!("field table: {} rows", rows.len());
        Ok(Self::from_rows(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FieldRow] {
        &self.rows
    }

    pub fn contains(&self, polygon_uu: &str) -> bool {
        self.index.contains_key(polygon_uu)
    }

    /// Address label for a field, `不明` when absent.
    pub fn address_of(&self, polygon_uu: &str) -> &str {
        self.index
            .get(polygon_uu)
            .and_then(|&i| self.rows[i].address.as_deref())
            .unwrap_or(UNKNOWN_ADDRESS)
    }
}

/// A field to be sampled: identifier, address and boundary polygon (lon/lat).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTarget {
    pub polygon_uu: String,
    pub address: String,
    pub polygon: Polygon<f64>,
}

impl FieldTarget {
    /// Outer ring as `[lon, lat]` pairs, as stored in cache records.
    pub fn boundary_ring(&self) -> Vec<[f64; 2]> {
        self.polygon.exterior().coords().map(|c| [c.x, c.y]).collect()
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        bounding_rect(self.polygon.exterior().coords().copied())
    }
}

/// Join boundary features with the table, keeping file order of the boundaries.
pub fn load_targets(table: &FieldTable, boundaries: impl AsRef<Path>) -> Result<Vec<FieldTarget>> {
    let doc: Value = read_json(boundaries)?;
    targets_from_geojson(table, &doc)
}

pub fn targets_from_geojson(table: &FieldTable, doc: &Value) -> Result<Vec<FieldTarget>> {
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .filter(|_| doc.get("type").and_then(Value::as_str) == Some("FeatureCollection"))
        .ok_or_else(|| Error::InvalidBoundary {
            field: "<collection>".into(),
            reason: "expected a GeoJSON FeatureCollection".into(),
        })?;

    let mut targets = Vec::new();
    let mut skipped_geometry = 0usize;
    for feature in features {
        let Some(id) = feature
            .pointer("/properties/polygon_uu")
            .and_then(property_string)
        else {
            continue;
        };
        if !table.contains(&id) {
            continue;
        }

        let geometry = feature.get("geometry").unwrap_or(&Value::Null);
        if geometry.get("type").and_then(Value::as_str) != Some("Polygon") {
            skipped_geometry += 1;
            continue;
        }
        let polygon = parse_polygon(&id, geometry.get("coordinates"))?;
        targets.push(FieldTarget {
            address: table.address_of(&id).to_string(),
            polygon_uu: id,
            polygon,
        });
    }

    if skipped_geometry > 0 {
        tracing::debug!("skipped {skipped_geometry} non-Polygon features");
    }
    tracing::debug!("{} target fields", targets.len());
    Ok(targets)
}

/// Bounding rectangle of all target boundaries.
pub fn targets_bounds(targets: &[FieldTarget]) -> Option<Rect<f64>> {
    bounding_rect(
        targets
            .iter()
            .flat_map(|t| t.polygon.exterior().coords().copied()),
    )
}

fn bounding_rect(coords: impl Iterator<Item = Coord<f64>>) -> Option<Rect<f64>> {
    coords.fold(None, |acc: Option<Rect<f64>>, c| {
        Some(match acc {
            None => Rect::new(c, c),
            Some(r) => Rect::new(
                Coord {
                    x: r.min().x.min(c.x),
                    y: r.min().y.min(c.y),
                },
                Coord {
                    x: r.max().x.max(c.x),
                    y: r.max().y.max(c.y),
                },
            ),
        })
    })
}

fn property_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_polygon(id: &str, coordinates: Option<&Value>) -> Result<Polygon<f64>> {
    let invalid = |reason: &str| Error::InvalidBoundary {
        field: id.to_string(),
        reason: reason.to_string(),
    };

    let rings = coordinates
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing coordinates"))?;
    let mut parsed = Vec::with_capacity(rings.len());
    for ring in rings {
        let points = ring
            .as_array()
            .ok_or_else(|| invalid("ring is not an array"))?;
        let mut coords = Vec::with_capacity(points.len());
        for p in points {
            let pair = p.as_array().filter(|a| a.len() >= 2);
            let xy = pair.and_then(|a| Some((a[0].as_f64()?, a[1].as_f64()?)));
            let (x, y) = xy.ok_or_else(|| invalid("position is not [lon, lat]"))?;
            coords.push(Coord { x, y });
        }
        parsed.push(LineString::new(coords));
    }

    let mut rings = parsed.into_iter();
    let exterior = rings.next().ok_or_else(|| invalid("polygon has no rings"))?;
    if exterior.0.len() < 3 {
        return Err(invalid("outer ring has fewer than 3 positions"));
    }
    Ok(Polygon::new(exterior, rings.collect()))
}
