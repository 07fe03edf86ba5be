//! Leaflet map documents built from cached per-date records.
//!
//! One document per index. Every cached date becomes an overlay layer
//! (`NDVI_2025-12-14`, ...) holding one colored rectangle per pixel plus the
//! field outlines; only the latest date starts visible. Pixel data is
//! embedded as JSON and drawn by a small script, so the page needs nothing
//! but Leaflet from the CDN.

use std::path::{Path, PathBuf};

use serde::Serialize;

use mugimap_core::io::write_text;
use mugimap_core::{DateCacheRecord, Error, IndexKind, ObservationDate, Result};

use crate::scheme::BucketScheme;

/// Metres per degree of latitude, also used for longitude at field scale.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Map placement and pixel geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Map centre as `(lat, lon)`.
    pub center: (f64, f64),
    pub zoom: u8,
    /// Nominal ground resolution in metres; sets the rectangle size.
    pub pixel_scale: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            center: (0.0, 0.0),
            zoom: 15,
            pixel_scale: 10.0,
        }
    }
}

impl RenderOptions {
    /// Half the rectangle edge, in degrees.
    pub fn half_size(&self) -> f64 {
        self.pixel_scale / 2.0 / METRES_PER_DEGREE
    }
}

/// Figures shown in the title panel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapSummary {
    /// Every ledger date, any order.
    pub dates: Vec<ObservationDate>,
    pub field_count: usize,
    pub total_pixels: u64,
    /// Latest date processed on this run, if any.
    pub latest_new_date: Option<ObservationDate>,
    /// Scene cloud cover limit in percent.
    pub cloud_threshold: f64,
}

#[derive(Debug, Serialize)]
struct Layer {
    name: String,
    show: bool,
    cells: Vec<Cell>,
    /// Field outlines as `[lat, lon]` rings.
    outlines: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Serialize)]
struct Cell {
    bounds: [[f64; 2]; 2],
    color: String,
    popup: String,
    tooltip: String,
}

/// Value as shown in popups: three decimals, `N/A` when missing.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.3}"),
        _ => "N/A".to_string(),
    }
}

/// Build the overlay layers for one index, dates ascending.
fn build_layers(kind: IndexKind, records: &[DateCacheRecord], options: &RenderOptions) -> Vec<Layer> {
    let scheme = BucketScheme::for_index(kind);
    let half = options.half_size();

    let mut order: Vec<&DateCacheRecord> = records.iter().collect();
    order.sort_by_key(|r| r.date);
    let latest = order.last().map(|r| r.date);

    order
        .into_iter()
        .map(|record| {
            let date = record.date;
            let mut cells = Vec::with_capacity(record.pixel_count());
            let mut outlines: Vec<Vec<[f64; 2]>> = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let address = escape_html(&field.address);
                for pixel in &field.pixels {
                    let value = pixel.value(kind);
                    let shown = format_value(value);
                    cells.push(Cell {
                        bounds: [
                            [pixel.lat - half, pixel.lon - half],
                            [pixel.lat + half, pixel.lon + half],
                        ],
                        color: scheme.color(value).to_string(),
                        popup: format!(
                            "<b>{address}</b><br>日付: {date}<br>{}: {shown}",
                            kind.name()
                        ),
                        tooltip: format!("{date}: {} {shown}", kind.name()),
                    });
                }
                outlines.push(field.boundary.iter().map(|&[lon, lat]| [lat, lon]).collect());
            }
            Layer {
                name: format!("{}_{}", kind.name(), date),
                show: Some(date) == latest,
                cells,
                outlines,
            }
        })
        .collect()
}

/// Render the complete HTML document for one index.
pub fn render_map(
    kind: IndexKind,
    records: &[DateCacheRecord],
    summary: &MapSummary,
    options: &RenderOptions,
) -> serde_json::Result<String> {
    let layers = build_layers(kind, records, options);
    // keep "</script>" in addresses from closing the data block
    let layers_json = serde_json::to_string(&layers)?.replace("</", "<\\/");

    let scheme = BucketScheme::for_index(kind);
    let (heading, gradient) = title_style(kind);

    Ok(MAP_HTML
        .replace("__PAGE_TITLE__", &format!("{} マップ", kind.name()))
        .replace("__TITLE_PANEL__", &title_panel(kind, heading, gradient, summary))
        .replace("__LEGEND_PANEL__", &legend_panel(kind, scheme))
        .replace("__CENTER_LAT__", &options.center.0.to_string())
        .replace("__CENTER_LON__", &options.center.1.to_string())
        .replace("__ZOOM__", &options.zoom.to_string())
        .replace("__LAYERS__", &layers_json))
}

/// Render all three documents into `output_dir`, returning the written paths.
pub fn write_map_set(
    output_dir: &Path,
    records: &[DateCacheRecord],
    summary: &MapSummary,
    options: &RenderOptions,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(IndexKind::ALL.len());
    for kind in IndexKind::ALL {
        let path = output_dir.join(kind.output_file());
        let html = render_map(kind, records, summary, options).map_err(|source| Error::Json {
            path: path.clone(),
            source,
        })?;
        write_text(&path, &html)?;
        tracing::debug!("wrote {} ({} bytes)", path.display(), html.len());
        written.push(path);
    }
    Ok(written)
}

fn title_style(kind: IndexKind) -> (&'static str, (&'static str, &'static str)) {
    match kind {
        IndexKind::Ndvi => ("🌾 NDVI マップ（植生活性度）", ("#11998e", "#38ef7d")),
        IndexKind::Ndwi => ("💧 NDWI マップ（水分状態）", ("#4169E1", "#87CEEB")),
        IndexKind::Gndvi => ("🍃 GNDVI マップ（クロロフィル）", ("#228B22", "#32CD32")),
    }
}

fn title_panel(
    kind: IndexKind,
    heading: &str,
    (from, to): (&str, &str),
    summary: &MapSummary,
) -> String {
    let mut dates = summary.dates.clone();
    dates.sort();
    let range = match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => format!("{first} 〜 {last}"),
        _ => "-".to_string(),
    };
    let latest = summary
        .latest_new_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    let id = format!("map-title-{}", kind.name().to_lowercase());

    format!(
        r#"<div id="{id}" class="map-title" style="background: linear-gradient(135deg, {from} 0%, {to} 100%);">
    <h3>{heading}</h3>
    <p>
        📅 {range} ({days}日)<br>
        📍 {fields}筆 | 🔲 {pixels}px<br>
        🆕 {latest} | ☁️ {cloud}%以下
    </p>
</div>"#,
        days = dates.len(),
        fields = summary.field_count,
        pixels = group_thousands(summary.total_pixels),
        cloud = summary.cloud_threshold,
    )
}

fn legend_panel(kind: IndexKind, scheme: &BucketScheme) -> String {
    let mut html = format!(
        "<div id=\"map-legend\">\n<h4>{}（{}）</h4>\n",
        kind.name(),
        scheme.subject
    );
    for bucket in scheme.buckets() {
        html.push_str(&format!(
            "<p><span style=\"color:{};\">■</span> {}</p>\n",
            bucket.color,
            escape_html(&bucket.legend_text(scheme.range_sep))
        ));
    }
    html.push_str("</div>");
    html
}

/// `1234567` -> `1,234,567`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const MAP_HTML: &str = r##"<!DOCTYPE html>
<html lang="ja">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>__PAGE_TITLE__</title>
  <link
    rel="stylesheet"
    href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"
    integrity="sha256-p4NxAoJBhIIN+hmNHrzRCf9tD/miZyoHS5obTRR9BMY="
    crossorigin=""
  />
  <style>
    html, body { height: 100%; margin: 0; padding: 0; }
    #map { height: 100%; width: 100%; }
    .map-title {
      position: fixed; top: 10px; left: 10px; z-index: 9999;
      border: 2px solid white; padding: 10px; border-radius: 8px;
      box-shadow: 0 4px 15px rgba(0,0,0,0.3); color: white;
      max-width: calc(100vw - 20px); box-sizing: border-box;
    }
    .map-title h3 { margin: 0; font-size: clamp(14px, 4vw, 20px); }
    .map-title p { margin: 5px 0 0 0; font-size: clamp(10px, 2.5vw, 13px); opacity: 0.9; line-height: 1.4; }
    #map-legend {
      position: fixed; bottom: 10px; left: 10px; z-index: 9999;
      background-color: white; border: 2px solid #2c3e50; padding: 10px;
      border-radius: 8px; box-shadow: 0 4px 15px rgba(0,0,0,0.3);
    }
    #map-legend h4 {
      margin: 0 0 8px 0; border-bottom: 2px solid #3498db; padding-bottom: 3px;
      font-size: clamp(12px, 3vw, 16px);
    }
    #map-legend p { margin: 3px 0; font-size: clamp(10px, 2.5vw, 14px); }
    #map-legend span { font-size: clamp(14px, 3.5vw, 20px); }
    #layerButtons {
      position: fixed; bottom: 10px; right: 10px; z-index: 1000;
      background: white; padding: 8px; border-radius: 8px; box-shadow: 0 2px 6px rgba(0,0,0,0.3);
    }
    #layerButtons button {
      display: block; width: 100%; padding: 6px 12px; font-size: 13px; color: white;
      border: none; border-radius: 4px; cursor: pointer;
    }
    #selectAll { margin-bottom: 4px; background: #3498db; }
    #deselectAll { background: #95a5a6; }
    @media (max-width: 768px) {
      .map-title { left: 5px; top: 5px; padding: 8px; max-width: calc(100vw - 10px); }
      .map-title h3 { font-size: 12px; }
      .map-title p { font-size: 9px; }
      #map-legend { bottom: 5px; left: 5px; padding: 6px; max-width: 110px; }
      #map-legend h4 { font-size: 10px; margin-bottom: 4px; }
      #map-legend p { font-size: 8px; margin: 1px 0; }
      #map-legend span { font-size: 12px; }
    }
  </style>
</head>
<body>
  <div id="map"></div>
  __TITLE_PANEL__
  __LEGEND_PANEL__
  <div id="layerButtons">
    <button id="selectAll" onclick="selectAllLayers()">全選択</button>
    <button id="deselectAll" onclick="deselectAllLayers()">全解除</button>
  </div>

  <script
    src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"
    integrity="sha256-20nQCchB9co0qIjJZRGuk2/Z9VM+kNiyxNV1lvTlZBo="
    crossorigin=""
  ></script>
  <script>
    const map = L.map('map').setView([__CENTER_LAT__, __CENTER_LON__], __ZOOM__);
    const osm = L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
      maxZoom: 19,
      attribution: '&copy; OpenStreetMap contributors'
    }).addTo(map);

    const layers = __LAYERS__;
    const overlays = {};
    for (const layer of layers) {
      const group = L.featureGroup();
      for (const cell of layer.cells) {
        L.rectangle(cell.bounds, {
          color: cell.color, weight: 0.5, fill: true, fillColor: cell.color, fillOpacity: 0.8
        }).bindPopup(cell.popup).bindTooltip(cell.tooltip).addTo(group);
      }
      for (const ring of layer.outlines) {
        L.polygon(ring, { color: '#000000', weight: 2, fill: false }).addTo(group);
      }
      overlays[layer.name] = group;
      if (layer.show) group.addTo(map);
    }
    L.control.layers({ 'OpenStreetMap': osm }, overlays, { position: 'topright', collapsed: false }).addTo(map);

    function selectAllLayers() {
      document.querySelectorAll('.leaflet-control-layers-selector').forEach(cb => {
        if (!cb.checked) cb.click();
      });
    }
    function deselectAllLayers() {
      document.querySelectorAll('.leaflet-control-layers-selector').forEach(cb => {
        if (cb.checked) cb.click();
      });
    }
  </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mugimap_core::{FieldRecord, PixelRecord};

    fn record(date: &str, ndvi: Option<f64>) -> DateCacheRecord {
        let mut rec = DateCacheRecord::new(date.parse().unwrap());
        rec.fields.push(FieldRecord {
            polygon_uu: "uu-1".into(),
            address: "大字新庄 <1>".into(),
            boundary: vec![[131.0, 33.0], [131.001, 33.0], [131.001, 33.001], [131.0, 33.0]],
            pixels: vec![PixelRecord {
                lat: 33.0005,
                lon: 131.0005,
                ndvi,
                ndwi: Some(-0.2),
                gndvi: None,
            }],
        });
        rec
    }

    #[test]
    fn half_size_from_pixel_scale() {
        let opts = RenderOptions::default();
        assert_relative_eq!(opts.half_size(), 10.0 / 2.0 / 111_320.0);
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(Some(0.41234)), "0.412");
        assert_eq!(format_value(Some(-0.1)), "-0.100");
        assert_eq!(format_value(None), "N/A");
        assert_eq!(format_value(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn only_latest_layer_visible() {
        let records = vec![record("2025-12-14", Some(0.5)), record("2025-12-02", Some(0.2))];
        let layers = build_layers(IndexKind::Ndvi, &records, &RenderOptions::default());
        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["NDVI_2025-12-02", "NDVI_2025-12-14"]);
        assert!(!layers[0].show);
        assert!(layers[1].show);
    }

    #[test]
    fn missing_newest_cache_shows_latest_readable_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = mugimap_core::CacheStore::new(dir.path());
        store.write(&record("2025-12-02", Some(0.2))).unwrap();
        store.write(&record("2025-12-14", Some(0.5))).unwrap();
        let dates: Vec<_> = ["2025-12-02", "2025-12-14", "2025-12-26"]
            .iter()
            .map(|d| d.parse().unwrap())
            .collect();

        let records = store.read_all(&dates).unwrap();
        let layers = build_layers(IndexKind::Ndvi, &records, &RenderOptions::default());
        let visible: Vec<&str> = layers.iter().filter(|l| l.show).map(|l| l.name.as_str()).collect();
        assert_eq!(layers.len(), 2);
        assert_eq!(visible, vec!["NDVI_2025-12-14"]);
    }

    #[test]
    fn cells_carry_color_popup_and_tooltip() {
        let layers = build_layers(IndexKind::Ndvi, &[record("2025-12-02", Some(0.2))], &RenderOptions::default());
        let cell = &layers[0].cells[0];
        assert_eq!(cell.color, "#fc8d59");
        assert_eq!(cell.popup, "<b>大字新庄 &lt;1&gt;</b><br>日付: 2025-12-02<br>NDVI: 0.200");
        assert_eq!(cell.tooltip, "2025-12-02: NDVI 0.200");
        assert!(cell.bounds[0][0] < 33.0005 && cell.bounds[1][0] > 33.0005);

        let gndvi = build_layers(IndexKind::Gndvi, &[record("2025-12-02", Some(0.2))], &RenderOptions::default());
        assert_eq!(gndvi[0].cells[0].color, "#808080");
        assert!(gndvi[0].cells[0].tooltip.ends_with("GNDVI N/A"));
    }

    #[test]
    fn outlines_are_lat_lon() {
        let layers = build_layers(IndexKind::Ndwi, &[record("2025-12-02", None)], &RenderOptions::default());
        assert_eq!(layers[0].outlines.len(), 1);
        assert_eq!(layers[0].outlines[0][1], [33.0, 131.001]);
    }

    #[test]
    fn document_contains_panels_and_controls() {
        let records = vec![record("2025-12-02", Some(0.3)), record("2025-12-14", Some(0.7))];
        let summary = MapSummary {
            dates: records.iter().map(|r| r.date).collect(),
            field_count: 1,
            total_pixels: 12345,
            latest_new_date: Some("2025-12-14".parse().unwrap()),
            cloud_threshold: 50.0,
        };
        let opts = RenderOptions {
            center: (33.0005, 131.0005),
            ..Default::default()
        };
        let html = render_map(IndexKind::Ndvi, &records, &summary, &opts).unwrap();

        assert!(html.contains("🌾 NDVI マップ（植生活性度）"));
        assert!(html.contains("2025-12-02 〜 2025-12-14 (2日)"));
        assert!(html.contains("12,345px"));
        assert!(html.contains("🆕 2025-12-14 | ☁️ 50%以下"));
        assert!(html.contains("やや低 (0.2-0.4)"));
        assert!(html.contains("setView([33.0005, 131.0005], 15)"));
        assert!(html.contains("position: 'topright', collapsed: false"));
        assert!(html.contains("全選択") && html.contains("全解除"));
        assert!(html.contains("NDVI_2025-12-14"));
        assert!(!html.contains("__LAYERS__"));
    }

    #[test]
    fn script_terminator_in_data_is_neutralised() {
        let mut rec = record("2025-12-02", Some(0.3));
        rec.fields[0].address = "</script><script>alert(1)".into();
        let html = render_map(IndexKind::Ndvi, &[rec], &MapSummary::default(), &RenderOptions::default()).unwrap();
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn writes_three_documents() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_map_set(
            dir.path(),
            &[record("2025-12-02", Some(0.3))],
            &MapSummary::default(),
            &RenderOptions::default(),
        )
        .unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index.html", "ndwi.html", "gndvi.html"]);
        let ndwi = std::fs::read_to_string(dir.path().join("ndwi.html")).unwrap();
        assert!(ndwi.contains("NDWI（水分）"));
    }
}
