//! Anchored local reference frame for rendering the globe in limited precision.
//!
//! ECEF magnitudes (~6.4e6 m) leave no room in `f32` for sub-meter terrain
//! detail. The frame scales the globe down, rotates the anchor point to face
//! `+Z`, and translates it to the origin so everything near the anchor lands
//! within a few tens of units.
//!
//! Local axes at the anchor: `+Z` up, `+Y` east, `-X` north.

use glam::{DMat4, DQuat, DVec3};

use crate::{
    GeoBounds, Geodetic, TileAddress, WGS84_A, bounds_around, calculate_zoom, ecef_to_lla,
    lat_lng_to_tile, lla_to_ecef,
};

/// Scale + rotate + translate transform from ECEF into the anchored local frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobeReference {
    address: TileAddress,
    bounds: GeoBounds,
    center: Geodetic,
    scale: f64,
    scaling_factor: f64,
    rotation: DQuat,
    matrix: DMat4,
    inverse: DMat4,
}

impl GlobeReference {
    /// Anchor the frame on the center of `address`, with a linear `scale`
    /// multiplier on top of the tile-derived scaling factor.
    #[must_use]
    pub fn new(address: TileAddress, scale: f64) -> Self {
        let bounds = address.bounds();
        let (lat, lon) = bounds.center();
        let mut frame = Self {
            address,
            bounds,
            center: Geodetic::new(lat, lon, 0.0),
            scale,
            scaling_factor: 1.0,
            rotation: DQuat::IDENTITY,
            matrix: DMat4::IDENTITY,
            inverse: DMat4::IDENTITY,
        };
        frame.update_matrix();
        frame
    }

    /// Re-anchor on an arbitrary rectangle. The anchor tile becomes the tile
    /// containing the rectangle's center at the rectangle's natural zoom.
    pub fn set_bounds(&mut self, bounds: GeoBounds) {
        let (lat, lon) = bounds.center();
        let zoom = calculate_zoom(&bounds);
        self.address = lat_lng_to_tile(lat, lon, zoom);
        self.bounds = bounds;
        self.center = Geodetic::new(lat, lon, 0.0);
        self.update_matrix();
    }

    /// Re-anchor on a geographic point at the given zoom level.
    pub fn set_center_and_zoom(&mut self, lat: f64, lon: f64, elevation: f64, zoom: u8) {
        self.address = lat_lng_to_tile(lat, lon, zoom);
        self.bounds = bounds_around(lat, lon, zoom);
        self.center = Geodetic::new(lat, lon, elevation);
        self.update_matrix();
    }

    /// Change the linear scale multiplier.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
        self.update_matrix();
    }

    fn update_matrix(&mut self) {
        self.scaling_factor = self.bounds.radius() * self.scale / WGS84_A;

        // Spin the anchor longitude onto the prime meridian, then tip its
        // latitude up to the pole.
        self.rotation = DQuat::from_rotation_y((self.center.latitude - 90.0).to_radians())
            * DQuat::from_rotation_z((-self.center.longitude).to_radians());

        let anchor = self.center.to_ecef() * self.scaling_factor;
        let translation = -(self.rotation * anchor);

        self.matrix = DMat4::from_scale_rotation_translation(
            DVec3::splat(self.scaling_factor),
            self.rotation,
            translation,
        );
        self.inverse = self.matrix.inverse();
    }

    /// The anchor tile.
    pub fn address(&self) -> TileAddress {
        self.address
    }

    /// Rectangle the scaling factor is derived from.
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Geodetic point that maps to the local origin.
    pub fn center(&self) -> Geodetic {
        self.center
    }

    /// Linear scale multiplier supplied by the caller.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Local units per ECEF meter.
    pub fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }

    /// Meters represented by one local unit.
    pub fn meters_per_unit(&self) -> f64 {
        1.0 / self.scaling_factor
    }

    /// ECEF → local transform.
    pub fn matrix(&self) -> DMat4 {
        self.matrix
    }

    /// Local → ECEF transform.
    pub fn inverse_matrix(&self) -> DMat4 {
        self.inverse
    }

    /// Local-space position of a geodetic point.
    #[must_use]
    pub fn to_local(&self, lat: f64, lon: f64, elevation: f64) -> DVec3 {
        self.matrix.transform_point3(lla_to_ecef(lat, lon, elevation))
    }

    /// Geodetic coordinates of a local-space position.
    #[must_use]
    pub fn to_geodetic(&self, local: DVec3) -> Geodetic {
        ecef_to_lla(self.inverse.transform_point3(local))
    }

    /// Rotation taking a local east-north-up basis at `(lat, lon)` into the
    /// anchored frame: `+X` east, `+Y` north, `+Z` up at that point.
    #[must_use]
    pub fn orientation_at(&self, lat: f64, lon: f64) -> DQuat {
        let enu_to_ecef = DQuat::from_rotation_z(lon.to_radians())
            * DQuat::from_rotation_y((90.0 - lat).to_radians())
            * DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2);
        self.rotation * enu_to_ecef
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> GlobeReference {
        GlobeReference::new(TileAddress::new(204, 401, 10), 1.0)
    }

    #[test]
    fn test_anchor_maps_to_origin() {
        let f = frame();
        let c = f.center();
        let local = f.to_local(c.latitude, c.longitude, 0.0);
        assert!(local.length() < 1e-9, "anchor at {local}");
    }

    #[test]
    fn test_up_is_positive_z() {
        let f = frame();
        let c = f.center();
        let local = f.to_local(c.latitude, c.longitude, 1000.0);
        let expected = 1000.0 * f.scaling_factor();
        assert!(local.x.abs() < 1e-9);
        assert!(local.y.abs() < 1e-9);
        assert!((local.z - expected).abs() < 1e-9);
    }

    #[test]
    fn test_east_is_positive_y_and_north_is_negative_x() {
        let f = frame();
        let c = f.center();
        let east = f.to_local(c.latitude, c.longitude + 0.01, 0.0);
        let north = f.to_local(c.latitude + 0.01, c.longitude, 0.0);
        assert!(east.y > 0.0 && east.y.abs() > east.x.abs() * 10.0);
        assert!(north.x < 0.0 && north.x.abs() > north.y.abs() * 10.0);
    }

    #[test]
    fn test_anchor_tile_stays_within_tens_of_units() {
        for address in [
            TileAddress::new(0, 0, 1),
            TileAddress::new(204, 401, 10),
            TileAddress::new(3372, 6504, 14),
        ] {
            let f = GlobeReference::new(address, 1.0);
            let b = address.bounds();
            for (lat, lon) in [
                (b.north, b.west),
                (b.north, b.east),
                (b.south, b.west),
                (b.south, b.east),
            ] {
                let local = f.to_local(lat, lon, 3000.0);
                assert!(
                    local.length() < 50.0,
                    "{address}: corner at {} units",
                    local.length()
                );
            }
        }
    }

    #[test]
    fn test_to_geodetic_inverts_to_local() {
        let f = frame();
        let local = f.to_local(35.2, -106.4, 1850.0);
        let back = f.to_geodetic(local);
        assert!((back.latitude - 35.2).abs() < 1e-6);
        assert!((back.longitude + 106.4).abs() < 1e-6);
        assert!((back.elevation - 1850.0).abs() < 1e-3);
    }

    #[test]
    fn test_scale_multiplies_scaling_factor() {
        let mut f = frame();
        let base = f.scaling_factor();
        f.set_scale(2.0);
        assert!((f.scaling_factor() - 2.0 * base).abs() < base * 1e-12);
        assert!((f.meters_per_unit() * f.scaling_factor() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_set_center_and_zoom_reanchors() {
        let mut f = frame();
        f.set_center_and_zoom(46.85, -121.76, 0.0, 12);
        assert_eq!(f.address(), lat_lng_to_tile(46.85, -121.76, 12));
        assert!(f.to_local(46.85, -121.76, 0.0).length() < 1e-9);
    }

    #[test]
    fn test_set_bounds_reanchors_on_center() {
        let mut f = frame();
        let b = GeoBounds::new(36.0, 35.0, -105.0, -106.0);
        f.set_bounds(b);
        assert_eq!(f.bounds(), b);
        assert!(f.to_local(35.5, -105.5, 0.0).length() < 1e-9);
    }

    #[test]
    fn test_orientation_at_anchor_is_enu() {
        let f = frame();
        let c = f.center();
        let q = f.orientation_at(c.latitude, c.longitude);
        let east = q * DVec3::X;
        let north = q * DVec3::Y;
        let up = q * DVec3::Z;
        assert!((east - DVec3::Y).length() < 1e-9, "east -> {east}");
        assert!((north + DVec3::X).length() < 1e-9, "north -> {north}");
        assert!((up - DVec3::Z).length() < 1e-9, "up -> {up}");
    }
}
