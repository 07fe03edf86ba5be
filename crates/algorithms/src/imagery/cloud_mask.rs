//! Cloud masking from the Sentinel-2 L2A scene classification (SCL) band.

use ndarray::Array2;

/// Scene classification classes of the L2A SCL band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SclClass {
    NoData = 0,
    SaturatedOrDefective = 1,
    DarkArea = 2,
    CloudShadow = 3,
    Vegetation = 4,
    NotVegetated = 5,
    Water = 6,
    Unclassified = 7,
    CloudMediumProbability = 8,
    CloudHighProbability = 9,
    ThinCirrus = 10,
    SnowOrIce = 11,
}

impl SclClass {
    pub fn from_code(code: u8) -> Option<Self> {
        use SclClass::*;
        Some(match code {
            0 => NoData,
            1 => SaturatedOrDefective,
            2 => DarkArea,
            3 => CloudShadow,
            4 => Vegetation,
            5 => NotVegetated,
            6 => Water,
            7 => Unclassified,
            8 => CloudMediumProbability,
            9 => CloudHighProbability,
            10 => ThinCirrus,
            11 => SnowOrIce,
            _ => return None,
        })
    }
}

/// Set of SCL classes whose pixels are dropped before sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudMask {
    excluded: Vec<SclClass>,
}

impl Default for CloudMask {
    /// No-data, defective, cloud shadow, medium/high cloud and cirrus.
    fn default() -> Self {
        Self {
            excluded: vec![
                SclClass::NoData,
                SclClass::SaturatedOrDefective,
                SclClass::CloudShadow,
                SclClass::CloudMediumProbability,
                SclClass::CloudHighProbability,
                SclClass::ThinCirrus,
            ],
        }
    }
}

impl CloudMask {
    pub fn new(excluded: impl IntoIterator<Item = SclClass>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
        }
    }

    pub fn excluded(&self) -> &[SclClass] {
        &self.excluded
    }

    /// Whether a pixel with this SCL code may be sampled.
    ///
    /// Codes outside the SCL legend (including NaN) are rejected.
    pub fn is_clear(&self, code: f64) -> bool {
        if !code.is_finite() || code < 0.0 || code > u8::MAX as f64 {
            return false;
        }
        match SclClass::from_code(code as u8) {
            Some(class) => !self.excluded.contains(&class),
            None => false,
        }
    }

    /// Per-pixel clear flags for an SCL window.
    pub fn clear_grid(&self, scl: &Array2<f64>) -> Array2<bool> {
        scl.mapv(|code| self.is_clear(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn default_excludes_cloud_classes() {
        let mask = CloudMask::default();
        for code in [0.0, 1.0, 3.0, 8.0, 9.0, 10.0] {
            assert!(!mask.is_clear(code), "class {code} should be masked");
        }
        for code in [2.0, 4.0, 5.0, 6.0, 7.0, 11.0] {
            assert!(mask.is_clear(code), "class {code} should be kept");
        }
    }

    #[test]
    fn unknown_codes_are_masked() {
        let mask = CloudMask::default();
        assert!(!mask.is_clear(12.0));
        assert!(!mask.is_clear(255.0));
        assert!(!mask.is_clear(f64::NAN));
        assert!(!mask.is_clear(-1.0));
    }

    #[test]
    fn custom_mask() {
        let mask = CloudMask::new([SclClass::Water]);
        assert!(!mask.is_clear(6.0));
        assert!(mask.is_clear(9.0));
    }

    #[test]
    fn grid() {
        let scl = array![[4.0, 9.0], [3.0, 5.0]];
        let clear = CloudMask::default().clear_grid(&scl);
        assert_eq!(clear, array![[true, false], [false, true]]);
    }
}
