//! Closed-form conversions between geodetic coordinates and earth-centered,
//! earth-fixed (ECEF) Cartesian coordinates on the WGS84 ellipsoid.
//!
//! Angles are in degrees, distances in meters.

use glam::DVec3;

/// WGS84 semi-major (equatorial) axis in meters.
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS84 semi-minor (polar) axis in meters.
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// First eccentricity squared.
const E2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);

/// Second eccentricity squared.
const EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// A geodetic position: latitude and longitude in degrees, elevation in meters
/// above the ellipsoid.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Geodetic {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl Geodetic {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }

    /// ECEF position of this point.
    #[must_use]
    pub fn to_ecef(&self) -> DVec3 {
        lla_to_ecef(self.latitude, self.longitude, self.elevation)
    }
}

/// Wrap latitude and longitude that overshoot by one turn back into
/// `[-90, 90]` and `[-180, 180]`.
#[must_use]
pub fn normalize_lat_lon(lat: f64, lon: f64) -> (f64, f64) {
    let mut lat = lat;
    let mut lon = lon;
    if lon > 180.0 {
        lon -= 360.0;
    }
    if lon < -180.0 {
        lon += 360.0;
    }
    if lat > 90.0 {
        lat -= 180.0;
    }
    if lat < -90.0 {
        lat += 180.0;
    }
    (lat, lon)
}

/// Prime vertical radius of curvature at the given geodetic latitude (radians).
#[inline]
fn prime_vertical_radius(lat_rad: f64) -> f64 {
    let s = lat_rad.sin();
    WGS84_A / (1.0 - E2 * s * s).sqrt()
}

/// Convert latitude, longitude (degrees) and elevation (meters) to ECEF.
#[must_use]
pub fn lla_to_ecef(lat: f64, lon: f64, elevation: f64) -> DVec3 {
    let (lat, lon) = normalize_lat_lon(lat, lon);
    let phi = lat.to_radians();
    let lambda = lon.to_radians();
    let n = prime_vertical_radius(phi);

    DVec3::new(
        (n + elevation) * phi.cos() * lambda.cos(),
        (n + elevation) * phi.cos() * lambda.sin(),
        ((WGS84_B * WGS84_B) / (WGS84_A * WGS84_A) * n + elevation) * phi.sin(),
    )
}

/// Convert an ECEF position back to geodetic coordinates using Bowring's
/// closed-form approximation.
///
/// Longitude is resolved with `atan2` so all four quadrants come back in
/// `(-180, 180]`. The elevation term is evaluated in a form that stays finite
/// at the poles.
#[must_use]
pub fn ecef_to_lla(ecef: DVec3) -> Geodetic {
    let DVec3 { x, y, z } = ecef;
    let p = (x * x + y * y).sqrt();
    let theta = (z * WGS84_A).atan2(p * WGS84_B);
    let (sin_t, cos_t) = theta.sin_cos();

    let phi = (z + EP2 * WGS84_B * sin_t * sin_t * sin_t)
        .atan2(p - E2 * WGS84_A * cos_t * cos_t * cos_t);
    let lambda = y.atan2(x);

    let (sin_p, cos_p) = phi.sin_cos();
    let elevation = p * cos_p + z * sin_p - WGS84_A * (1.0 - E2 * sin_p * sin_p).sqrt();

    Geodetic::new(phi.to_degrees(), lambda.to_degrees(), elevation)
}
