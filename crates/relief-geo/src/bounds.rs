//! Latitude/longitude rectangles.

use std::f64::consts::PI;

/// A geographic rectangle in degrees.
///
/// `north > south` always holds. `east < west` means the rectangle crosses the
/// antimeridian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        debug_assert!(north > south, "north {north} must exceed south {south}");
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Longitudinal extent in degrees, unwrapped across the antimeridian.
    #[must_use]
    pub fn width(&self) -> f64 {
        let mut east = self.east;
        if east < self.west {
            east += 360.0;
        }
        east - self.west
    }

    /// Latitudinal extent in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center `(lat, lon)`, with longitude wrapped back into `[-180, 180]`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        let lat = self.south + self.height() / 2.0;
        let mut lon = self.west + self.width() / 2.0;
        if lon > 180.0 {
            lon -= 360.0;
        }
        if lon < -180.0 {
            lon += 360.0;
        }
        (lat, lon)
    }

    /// Inclusive containment test, aware of antimeridian wrapping.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.south || lat > self.north {
            return false;
        }
        if self.east >= self.west {
            lon >= self.west && lon <= self.east
        } else {
            lon >= self.west || lon <= self.east
        }
    }

    /// Strict containment that also rejects rectangles reaching outside the
    /// valid lat/lon ranges.
    #[must_use]
    pub fn is_in_bounds(&self, lat: f64, lon: f64) -> bool {
        let valid = self.north > -90.0
            && self.north < 90.0
            && self.south > -90.0
            && self.south < 90.0
            && self.east > -180.0
            && self.east < 180.0
            && self.west > -180.0
            && self.west < 180.0;
        if !valid {
            return false;
        }
        let mut east = self.east;
        let mut lon = lon;
        if east < self.west {
            east += 360.0;
            if lon < self.west {
                lon += 360.0;
            }
        }
        lon < east && lon > self.west && lat < self.north && lat > self.south
    }

    /// Grow every side by `ratio` of the current extent.
    #[must_use]
    pub fn padded(&self, ratio: f64) -> Self {
        let pad_lat = self.height() * ratio;
        let pad_lon = self.width() * ratio;
        Self::new(
            self.north + pad_lat,
            self.south - pad_lat,
            self.east + pad_lon,
            self.west - pad_lon,
        )
    }

    /// Radius (in units of an arbitrary display globe) at which this rectangle
    /// covers a roughly constant on-screen area: `5 · sqrt(4π / A)` where `A`
    /// is the rectangle's area on the unit sphere.
    #[must_use]
    pub fn radius(&self) -> f64 {
        let band = self.north.to_radians().sin() - self.south.to_radians().sin();
        let area = band * self.width().to_radians();
        5.0 * (4.0 * PI / area).sqrt()
    }
}

/// Zoom level whose tiles best match the larger extent of `bounds`.
#[must_use]
pub fn calculate_zoom(bounds: &GeoBounds) -> u8 {
    let span = if bounds.height() > bounds.width() {
        bounds.height()
    } else {
        bounds.width()
    };
    let zoom = (180.0 / span).log2().round() + 1.0;
    zoom.clamp(0.0, 30.0) as u8
}

/// A rectangle centered on `(lat, lon)` sized for `zoom`: `180 / 2^(zoom+1)`
/// degrees of half-width in longitude and half that in latitude.
#[must_use]
pub fn bounds_around(lat: f64, lon: f64, zoom: u8) -> GeoBounds {
    let dim = 180.0 / 2f64.powi(i32::from(zoom) + 1);
    GeoBounds::new(lat + dim / 2.0, lat - dim / 2.0, lon + dim, lon - dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_simple() {
        let b = GeoBounds::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(b.center(), (5.0, 15.0));
    }

    #[test]
    fn test_center_across_antimeridian() {
        let b = GeoBounds::new(10.0, -10.0, -170.0, 170.0);
        assert!((b.width() - 20.0).abs() < 1e-12);
        let (lat, lon) = b.center();
        assert_eq!(lat, 0.0);
        assert!((lon.abs() - 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_contains_wrapping() {
        let b = GeoBounds::new(10.0, -10.0, -170.0, 170.0);
        assert!(b.contains(0.0, 175.0));
        assert!(b.contains(0.0, -175.0));
        assert!(!b.contains(0.0, 0.0));
        assert!(!b.contains(20.0, 175.0));
    }

    #[test]
    fn test_is_in_bounds_is_strict() {
        let b = GeoBounds::new(36.0, 34.0, -105.0, -107.0);
        assert!(b.is_in_bounds(35.0, -106.0));
        assert!(!b.is_in_bounds(36.0, -106.0));
        let wraps = GeoBounds::new(10.0, -10.0, -170.0, 170.0);
        assert!(wraps.is_in_bounds(0.0, -175.0));
    }

    #[test]
    fn test_padded_grows_each_side() {
        let b = GeoBounds::new(2.0, 0.0, 2.0, 0.0).padded(0.5);
        assert_eq!(b, GeoBounds::new(3.0, -1.0, 3.0, -1.0));
    }

    #[test]
    fn test_radius_whole_sphere_is_five() {
        let b = GeoBounds::new(90.0, -90.0, 180.0, -180.0);
        assert!((b.radius() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_radius_grows_for_smaller_regions() {
        let big = bounds_around(35.0, -106.0, 4);
        let small = bounds_around(35.0, -106.0, 10);
        assert!(small.radius() > big.radius());
    }

    #[test]
    fn test_calculate_zoom_matches_bounds_around() {
        for zoom in [2u8, 6, 10, 14] {
            let b = bounds_around(35.0, -106.0, zoom);
            assert_eq!(calculate_zoom(&b), zoom + 1);
        }
    }
}
