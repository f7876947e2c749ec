//! Ground sample distance per zoom level.

/// Meters per pixel of a 256-pixel tile at each zoom level, 0 through 20.
pub const DEFAULT_GROUND_SAMPLE_DISTANCE: [f64; 21] = [
    156_412.0, 78_206.0, 39_103.0, 19_551.0, 9_776.0, 4_888.0, 2_444.0, 1_222.0, 610.984,
    305.492, 152.746, 76.373, 38.187, 19.093, 9.547, 4.773, 2.387, 1.193, 0.596, 0.298, 0.149,
];

/// Monotonically decreasing table mapping zoom level to meters per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundSampleDistance(Vec<f64>);

impl Default for GroundSampleDistance {
    fn default() -> Self {
        Self(DEFAULT_GROUND_SAMPLE_DISTANCE.to_vec())
    }
}

impl GroundSampleDistance {
    /// Build from a custom table.
    ///
    /// # Panics
    ///
    /// Panics if the table is empty or not strictly decreasing.
    #[must_use]
    pub fn new(table: Vec<f64>) -> Self {
        assert!(!table.is_empty(), "ground sample distance table is empty");
        assert!(
            table.windows(2).all(|w| w[0] > w[1]),
            "ground sample distance table must be strictly decreasing"
        );
        Self(table)
    }

    /// Meters per pixel at `zoom`, clamped to the deepest tabulated level.
    #[must_use]
    pub fn for_zoom(&self, zoom: u8) -> f64 {
        let idx = usize::from(zoom).min(self.0.len() - 1);
        self.0[idx]
    }

    /// Deepest tabulated zoom.
    #[must_use]
    pub fn max_zoom(&self) -> u8 {
        u8::try_from(self.0.len() - 1).unwrap_or(u8::MAX)
    }

    /// Shallowest zoom whose ground sample distance is no coarser than
    /// `pixel_error` meters. Falls back to the deepest tabulated level.
    #[must_use]
    pub fn required_zoom(&self, pixel_error: f64) -> u8 {
        self.0
            .iter()
            .position(|&gsd| gsd <= pixel_error)
            .map_or(self.max_zoom(), |idx| u8::try_from(idx).unwrap_or(u8::MAX))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}
