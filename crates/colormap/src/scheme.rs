//! Five-bucket color tables for the field index maps.
//!
//! Each index has four thresholds splitting the value axis into five
//! buckets. Buckets are lower-inclusive: a value equal to a threshold falls
//! into the bucket above it.

use std::fmt;

use mugimap_core::IndexKind;

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Gray used for pixels without a value.
    pub const NODATA: Self = Self::new(0x80, 0x80, 0x80);
}

impl fmt::Display for Rgb {
    /// `#rrggbb`, lower case.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One bucket of a scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Inclusive lower bound, `None` for the open-ended first bucket.
    pub lower: Option<f64>,
    /// Exclusive upper bound, `None` for the open-ended last bucket.
    pub upper: Option<f64>,
    pub color: Rgb,
    pub label: &'static str,
}

impl Bucket {
    /// Legend text, e.g. `やや低 (0.2-0.4)`.
    pub fn legend_text(&self, range_sep: &str) -> String {
        match (self.lower, self.upper) {
            (None, Some(hi)) => format!("{} (<{})", self.label, hi),
            (Some(lo), None) => format!("{} (>{})", self.label, lo),
            (Some(lo), Some(hi)) => format!("{} ({}{}{})", self.label, lo, range_sep, hi),
            (None, None) => self.label.to_string(),
        }
    }
}

/// Thresholds, colors and labels of one index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketScheme {
    pub kind: IndexKind,
    pub thresholds: [f64; 4],
    pub colors: [Rgb; 5],
    pub labels: [&'static str; 5],
    /// What the index measures, for titles and legends.
    pub subject: &'static str,
    /// Range separator used in legend entries.
    pub range_sep: &'static str,
}

// ─── Tables ────────────────────────────────────────────────────────────

const VIGOUR_LABELS: [&str; 5] = ["低", "やや低", "中", "高", "非常に高"];

const NDVI_SCHEME: BucketScheme = BucketScheme {
    kind: IndexKind::Ndvi,
    thresholds: [0.2, 0.4, 0.6, 0.8],
    colors: [
        Rgb::new(0xd7, 0x30, 0x27),
        Rgb::new(0xfc, 0x8d, 0x59),
        Rgb::new(0xfe, 0xe0, 0x8b),
        Rgb::new(0x91, 0xcf, 0x60),
        Rgb::new(0x1a, 0x98, 0x50),
    ],
    labels: VIGOUR_LABELS,
    subject: "植生",
    range_sep: "-",
};

const NDWI_SCHEME: BucketScheme = BucketScheme {
    kind: IndexKind::Ndwi,
    thresholds: [-0.3, -0.1, 0.1, 0.3],
    colors: [
        Rgb::new(0x8b, 0x45, 0x13),
        Rgb::new(0xd2, 0x69, 0x1e),
        Rgb::new(0xf4, 0xa4, 0x60),
        Rgb::new(0x87, 0xce, 0xeb),
        Rgb::new(0x41, 0x69, 0xe1),
    ],
    labels: ["乾燥", "やや乾燥", "適度", "湿潤", "多湿"],
    subject: "水分",
    range_sep: "~",
};

const GNDVI_SCHEME: BucketScheme = BucketScheme {
    kind: IndexKind::Gndvi,
    thresholds: [0.2, 0.4, 0.6, 0.8],
    colors: [
        Rgb::new(0xff, 0xff, 0x00),
        Rgb::new(0x9a, 0xcd, 0x32),
        Rgb::new(0x32, 0xcd, 0x32),
        Rgb::new(0x22, 0x8b, 0x22),
        Rgb::new(0x00, 0x64, 0x00),
    ],
    labels: VIGOUR_LABELS,
    subject: "クロロフィル",
    range_sep: "-",
};

impl BucketScheme {
    pub fn for_index(kind: IndexKind) -> &'static BucketScheme {
        match kind {
            IndexKind::Ndvi => &NDVI_SCHEME,
            IndexKind::Ndwi => &NDWI_SCHEME,
            IndexKind::Gndvi => &GNDVI_SCHEME,
        }
    }

    /// Bucket position of `value`, `None` for missing or NaN values.
    pub fn bucket_index(&self, value: Option<f64>) -> Option<usize> {
        let v = value.filter(|v| !v.is_nan())?;
        Some(self.thresholds.iter().take_while(|&&t| v >= t).count())
    }

    /// Fill color for a pixel value.
    pub fn color(&self, value: Option<f64>) -> Rgb {
        self.bucket_index(value)
            .map(|i| self.colors[i])
            .unwrap_or(Rgb::NODATA)
    }

    pub fn buckets(&self) -> [Bucket; 5] {
        std::array::from_fn(|i| Bucket {
            lower: i.checked_sub(1).map(|j| self.thresholds[j]),
            upper: self.thresholds.get(i).copied(),
            color: self.colors[i],
            label: self.labels[i],
        })
    }
}

/// Shorthand for `BucketScheme::for_index(kind).color(value)`.
pub fn color_for(kind: IndexKind, value: Option<f64>) -> Rgb {
    BucketScheme::for_index(kind).color(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip_format() {
        assert_eq!(Rgb::NODATA.to_string(), "#808080");
        assert_eq!(Rgb::from_hex("#8B4513"), Some(Rgb::new(0x8b, 0x45, 0x13)));
        assert_eq!(Rgb::from_hex("8B4513"), None);
        assert_eq!(Rgb::from_hex("#8B45"), None);
    }

    #[test]
    fn ndvi_buckets_are_lower_inclusive() {
        assert_eq!(color_for(IndexKind::Ndvi, Some(0.2)).to_string(), "#fc8d59");
        assert_eq!(color_for(IndexKind::Ndvi, Some(0.1999)).to_string(), "#d73027");
        assert_eq!(color_for(IndexKind::Ndvi, Some(0.8)).to_string(), "#1a9850");
        assert_eq!(color_for(IndexKind::Ndvi, Some(-0.5)).to_string(), "#d73027");
        assert_eq!(BucketScheme::for_index(IndexKind::Ndvi).labels[1], "やや低");
    }

    #[test]
    fn ndwi_negative_thresholds() {
        let s = BucketScheme::for_index(IndexKind::Ndwi);
        assert_eq!(s.bucket_index(Some(-0.31)), Some(0));
        assert_eq!(s.bucket_index(Some(-0.3)), Some(1));
        assert_eq!(s.bucket_index(Some(0.0)), Some(2));
        assert_eq!(s.bucket_index(Some(0.3)), Some(4));
        assert_eq!(s.color(Some(0.15)), Rgb::from_hex("#87CEEB").unwrap());
    }

    #[test]
    fn gndvi_colors() {
        assert_eq!(color_for(IndexKind::Gndvi, Some(0.0)), Rgb::from_hex("#FFFF00").unwrap());
        assert_eq!(color_for(IndexKind::Gndvi, Some(0.65)), Rgb::from_hex("#228B22").unwrap());
        assert_eq!(color_for(IndexKind::Gndvi, Some(0.95)), Rgb::from_hex("#006400").unwrap());
    }

    #[test]
    fn missing_values_are_gray() {
        for kind in IndexKind::ALL {
            assert_eq!(color_for(kind, None), Rgb::NODATA);
            assert_eq!(color_for(kind, Some(f64::NAN)), Rgb::NODATA);
        }
    }

    #[test]
    fn legend_entries() {
        let b = BucketScheme::for_index(IndexKind::Ndvi).buckets();
        assert_eq!(b[0].legend_text("-"), "低 (<0.2)");
        assert_eq!(b[1].legend_text("-"), "やや低 (0.2-0.4)");
        assert_eq!(b[4].legend_text("-"), "非常に高 (>0.8)");

        let s = BucketScheme::for_index(IndexKind::Ndwi);
        assert_eq!(s.buckets()[1].legend_text(s.range_sep), "やや乾燥 (-0.3~-0.1)");
    }
}
