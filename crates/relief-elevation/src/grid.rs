//! Square floating-point height rasters.

/// Errors from building or reshaping an [`ElevationGrid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Raster is not square.
    #[error("elevation raster must be square, got {width}x{height}")]
    NotSquare { width: u32, height: u32 },
    /// Too few samples to extrapolate or interpolate.
    #[error("elevation grid of side {0} is too small (need at least 2)")]
    TooSmall(u32),
    /// Sample buffer length disagrees with the declared side length.
    #[error("expected {expected} height samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// A square raster of heights in meters, row-major with `y` growing southward.
#[derive(Clone, Debug, PartialEq)]
pub struct ElevationGrid {
    size: u32,
    heights: Vec<f32>,
}

impl ElevationGrid {
    /// Wrap a row-major height buffer of `size × size` samples.
    pub fn from_heights(size: u32, heights: Vec<f32>) -> Result<Self, GridError> {
        let expected = (size as usize) * (size as usize);
        if heights.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: heights.len(),
            });
        }
        Ok(Self { size, heights })
    }

    /// A grid filled from `f(x, y)`.
    pub fn from_fn(size: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut heights = Vec::with_capacity((size as usize) * (size as usize));
        for y in 0..size {
            for x in 0..size {
                heights.push(f(x, y));
            }
        }
        Self { size, heights }
    }

    /// A flat grid at `height`.
    #[must_use]
    pub fn flat(size: u32, height: f32) -> Self {
        Self::from_fn(size, |_, _| height)
    }

    /// Samples along one side.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.size as usize) + x as usize
    }

    /// Height at an integer raster position.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` is outside the grid.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        assert!(
            x < self.size && y < self.size,
            "({x}, {y}) outside grid of side {}",
            self.size
        );
        self.heights[self.index(x, y)]
    }

    /// Bilinear height at a fractional raster position, clamped to the grid.
    pub fn sample(&self, x: f64, y: f64) -> f32 {
        let max = f64::from(self.size - 1);
        let x = x.clamp(0.0, max);
        let y = y.clamp(0.0, max);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.size - 1);
        let y1 = (y0 + 1).min(self.size - 1);
        let fx = x - f64::from(x0);
        let fy = y - f64::from(y0);

        let top = f64::from(self.get(x0, y0)) * (1.0 - fx) + f64::from(self.get(x1, y0)) * fx;
        let bottom = f64::from(self.get(x0, y1)) * (1.0 - fx) + f64::from(self.get(x1, y1)) * fx;
        (top * (1.0 - fy) + bottom * fy) as f32
    }

    /// Grow by one column on the east edge and one row on the south edge.
    ///
    /// Each new sample continues the slope of the two samples before it:
    /// `border = edge + (edge - edge_minus_one)`. The south-east corner is
    /// extrapolated from the already padded east column.
    pub fn pad(&self) -> Result<Self, GridError> {
        let n = self.size;
        if n < 2 {
            return Err(GridError::TooSmall(n));
        }
        let padded = n + 1;
        let mut heights = vec![0.0f32; (padded as usize) * (padded as usize)];
        let at = |x: u32, y: u32| (y as usize) * (padded as usize) + x as usize;

        for y in 0..n {
            for x in 0..n {
                heights[at(x, y)] = self.get(x, y);
            }
            let edge = self.get(n - 1, y);
            heights[at(n, y)] = edge + (edge - self.get(n - 2, y));
        }
        for x in 0..padded {
            let edge = heights[at(x, n - 1)];
            let inner = heights[at(x, n - 2)];
            heights[at(x, n)] = edge + (edge - inner);
        }

        Ok(Self {
            size: padded,
            heights,
        })
    }

    /// Bilinearly resample to a new side length, keeping the corners aligned.
    pub fn resample(&self, size: u32) -> Result<Self, GridError> {
        if size < 2 || self.size < 2 {
            return Err(GridError::TooSmall(size.min(self.size)));
        }
        if size == self.size {
            return Ok(self.clone());
        }
        let ratio = f64::from(self.size - 1) / f64::from(size - 1);
        Ok(Self::from_fn(size, |x, y| {
            self.sample(f64::from(x) * ratio, f64::from(y) * ratio)
        }))
    }

    /// Lowest height in the grid.
    pub fn min(&self) -> f32 {
        self.heights.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Highest height in the grid.
    pub fn max(&self) -> f32 {
        self.heights.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(size: u32) -> ElevationGrid {
        ElevationGrid::from_fn(size, |x, y| (x * 2 + y * 10) as f32)
    }

    #[test]
    fn test_from_heights_checks_length() {
        assert_eq!(
            ElevationGrid::from_heights(3, vec![0.0; 8]),
            Err(GridError::LengthMismatch {
                expected: 9,
                actual: 8
            })
        );
        assert!(ElevationGrid::from_heights(3, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn test_pad_extrapolates_linear_slope() {
        let padded = ramp(4).pad().expect("pad");
        assert_eq!(padded.size(), 5);
        // Interior is untouched.
        assert_eq!(padded.get(3, 3), 36.0);
        // A linear ramp stays linear through the new border.
        assert_eq!(padded.get(4, 0), 8.0);
        assert_eq!(padded.get(0, 4), 40.0);
        assert_eq!(padded.get(4, 4), 48.0);
    }

    #[test]
    fn test_pad_uses_adjacent_gradient() {
        let grid = ElevationGrid::from_fn(3, |x, _| [0.0, 5.0, 7.0][x as usize]);
        let padded = grid.pad().expect("pad");
        assert_eq!(padded.get(3, 1), 9.0, "7 + (7 - 5)");
    }

    #[test]
    fn test_pad_rejects_tiny_grid() {
        assert_eq!(
            ElevationGrid::flat(1, 0.0).pad(),
            Err(GridError::TooSmall(1))
        );
    }

    #[test]
    fn test_sample_bilinear() {
        let grid = ramp(3);
        assert_eq!(grid.sample(0.5, 0.0), 1.0);
        assert_eq!(grid.sample(0.0, 0.5), 5.0);
        assert_eq!(grid.sample(1.5, 1.5), 18.0);
        // Clamped outside.
        assert_eq!(grid.sample(-4.0, 10.0), grid.get(0, 2));
    }

    #[test]
    fn test_resample_preserves_corners_and_linear_data() {
        let grid = ramp(5);
        let up = grid.resample(9).expect("resample");
        assert_eq!(up.size(), 9);
        assert_eq!(up.get(0, 0), grid.get(0, 0));
        assert_eq!(up.get(8, 8), grid.get(4, 4));
        assert_eq!(up.get(1, 0), 1.0);
    }

    #[test]
    fn test_min_max() {
        let grid = ElevationGrid::from_fn(4, |x, y| x as f32 - y as f32 * 3.0);
        assert_eq!(grid.min(), -9.0);
        assert_eq!(grid.max(), 3.0);
    }
}
