//! Slippy-map tile addressing on the Web-Mercator quadtree pyramid.

use std::f64::consts::PI;

use crate::GeoBounds;

/// Errors from constructing tile addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    /// Zoom level beyond what a `u32` grid can address.
    #[error("zoom {0} exceeds maximum zoom {max}", max = TileAddress::MAX_ZOOM)]
    ZoomOutOfRange(u8),
    /// Tile coordinate outside the `2^z × 2^z` grid.
    #[error("tile ({x}, {y}) out of range for zoom {z}")]
    OutOfRange { x: u32, y: u32, z: u8 },
}

/// Identifies one cell of the slippy quadtree.
///
/// At zoom `z` the world is a `2^z × 2^z` grid; `x` grows eastward from the
/// antimeridian and `y` grows southward from the northern Mercator limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileAddress {
    /// Highest zoom whose grid still fits in `u32` coordinates.
    pub const MAX_ZOOM: u8 = 30;

    /// Number of tiles along one axis at zoom `z`.
    ///
    /// # Panics
    ///
    /// Panics if `z` exceeds [`Self::MAX_ZOOM`].
    #[must_use]
    pub fn grid_size(z: u8) -> u32 {
        assert!(
            z <= Self::MAX_ZOOM,
            "zoom {z} exceeds MAX_ZOOM {}",
            Self::MAX_ZOOM
        );
        1u32 << z
    }

    /// Construct an address, validating `0 <= x, y < 2^z`.
    pub fn try_new(x: u32, y: u32, z: u8) -> Result<Self, GeoError> {
        if z > Self::MAX_ZOOM {
            return Err(GeoError::ZoomOutOfRange(z));
        }
        let size = Self::grid_size(z);
        if x >= size || y >= size {
            return Err(GeoError::OutOfRange { x, y, z });
        }
        Ok(Self { x, y, z })
    }

    /// Construct an address.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range for the zoom level.
    #[must_use]
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        match Self::try_new(x, y, z) {
            Ok(address) => address,
            Err(err) => panic!("{err}"),
        }
    }

    /// The single tile covering the whole world.
    #[must_use]
    pub fn root() -> Self {
        Self { x: 0, y: 0, z: 0 }
    }

    /// Geographic extent of this tile.
    #[must_use]
    pub fn bounds(&self) -> GeoBounds {
        tile_bounds(self.x, self.y, self.z)
    }

    /// The four child tiles one zoom level deeper, ordered
    /// `[(2x, 2y), (2x+1, 2y), (2x, 2y+1), (2x+1, 2y+1)]`.
    ///
    /// Returns `None` at [`Self::MAX_ZOOM`].
    #[must_use]
    pub fn children(&self) -> Option<[TileAddress; 4]> {
        if self.z >= Self::MAX_ZOOM {
            return None;
        }
        Some(split_tile_coordinates(self.x, self.y, self.z))
    }

    /// The enclosing tile one zoom level up, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<TileAddress> {
        if self.z == 0 {
            return None;
        }
        Some(TileAddress {
            x: self.x / 2,
            y: self.y / 2,
            z: self.z - 1,
        })
    }

    /// Whether `other` is this tile or lies inside it at a deeper zoom.
    #[must_use]
    pub fn contains(&self, other: &TileAddress) -> bool {
        if other.z < self.z {
            return false;
        }
        let shift = u32::from(other.z - self.z);
        (other.x >> shift) == self.x && (other.y >> shift) == self.y
    }

    /// The tile containing a geographic point at zoom `z`.
    #[must_use]
    pub fn from_lat_lng(lat: f64, lon: f64, z: u8) -> Self {
        lat_lng_to_tile(lat, lon, z)
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[x:{},y:{},z:{}]", self.x, self.y, self.z)
    }
}

/// The four child addresses of `(x, y, z)`.
#[must_use]
pub fn split_tile_coordinates(x: u32, y: u32, z: u8) -> [TileAddress; 4] {
    let (cx, cy, cz) = (x * 2, y * 2, z + 1);
    [
        TileAddress::new(cx, cy, cz),
        TileAddress::new(cx + 1, cy, cz),
        TileAddress::new(cx, cy + 1, cz),
        TileAddress::new(cx + 1, cy + 1, cz),
    ]
}

/// Longitude of the west edge of tile column `x` (fractional columns allowed).
#[must_use]
pub fn tile_x_to_lon(x: f64, z: u8) -> f64 {
    x / f64::from(TileAddress::grid_size(z)) * 360.0 - 180.0
}

/// Latitude of the north edge of tile row `y` (fractional rows allowed).
#[must_use]
pub fn tile_y_to_lat(y: f64, z: u8) -> f64 {
    let n = PI * (1.0 - 2.0 * y / f64::from(TileAddress::grid_size(z)));
    n.sinh().atan().to_degrees()
}

/// Fractional tile column for a longitude.
#[must_use]
pub fn lon_to_tile_x(lon: f64, z: u8) -> f64 {
    let mut lon = lon;
    if lon < -180.0 {
        lon += 360.0;
    }
    if lon > 180.0 {
        lon -= 360.0;
    }
    (lon + 180.0) / 360.0 * f64::from(TileAddress::grid_size(z))
}

/// Fractional tile row for a latitude.
#[must_use]
pub fn lat_to_tile_y(lat: f64, z: u8) -> f64 {
    let mut lat = lat;
    if lat < -90.0 {
        lat += 180.0;
    }
    if lat > 90.0 {
        lat -= 180.0;
    }
    let phi = lat.to_radians();
    (1.0 - (phi.tan() + 1.0 / phi.cos()).ln() / PI) / 2.0 * f64::from(TileAddress::grid_size(z))
}

/// The tile containing `(lat, lon)` at zoom `z`, clamped to the grid so points
/// beyond the Mercator latitude limit land in the first or last row.
#[must_use]
pub fn lat_lng_to_tile(lat: f64, lon: f64, z: u8) -> TileAddress {
    let max = f64::from(TileAddress::grid_size(z) - 1);
    let x = lon_to_tile_x(lon, z).floor().clamp(0.0, max);
    let y = lat_to_tile_y(lat, z);
    let y = if y.is_nan() { 0.0 } else { y.floor().clamp(0.0, max) };
    TileAddress::new(x as u32, y as u32, z)
}

/// Geographic bounds of tile `(x, y, z)`.
#[must_use]
pub fn tile_bounds(x: u32, y: u32, z: u8) -> GeoBounds {
    GeoBounds::new(
        tile_y_to_lat(f64::from(y), z),
        tile_y_to_lat(f64::from(y + 1), z),
        tile_x_to_lon(f64::from(x + 1), z),
        tile_x_to_lon(f64::from(x), z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_covers_mercator_world() {
        let b = TileAddress::root().bounds();
        assert!((b.west + 180.0).abs() < 1e-12);
        assert!((b.east - 180.0).abs() < 1e-12);
        assert!((b.north - 85.051_128_779_806_59).abs() < 1e-9);
        assert!((b.south + 85.051_128_779_806_59).abs() < 1e-9);
    }

    #[test]
    fn test_split_produces_four_children_one_zoom_deeper() {
        let children = split_tile_coordinates(3, 5, 4);
        assert_eq!(children.len(), 4);
        for child in &children {
            assert_eq!(child.z, 5);
            assert_eq!(child.parent(), Some(TileAddress::new(3, 5, 4)));
        }
        assert_eq!(children[0], TileAddress::new(6, 10, 5));
        assert_eq!(children[3], TileAddress::new(7, 11, 5));
    }

    #[test]
    fn test_children_tile_parent_bounds_exactly() {
        for parent in [
            TileAddress::new(0, 0, 0),
            TileAddress::new(204, 401, 10),
            TileAddress::new(1023, 0, 10),
        ] {
            let pb = parent.bounds();
            let children = parent.children().expect("not at max zoom");
            let [nw, ne, sw, se] = children.map(|c| c.bounds());

            // Outer edges coincide with the parent.
            assert_eq!(nw.north, pb.north);
            assert_eq!(ne.north, pb.north);
            assert_eq!(sw.south, pb.south);
            assert_eq!(se.south, pb.south);
            assert_eq!(nw.west, pb.west);
            assert_eq!(sw.west, pb.west);
            assert_eq!(ne.east, pb.east);
            assert_eq!(se.east, pb.east);

            // Shared inner edges: no gap, no overlap.
            assert_eq!(nw.east, ne.west);
            assert_eq!(sw.east, se.west);
            assert_eq!(nw.south, sw.north);
            assert_eq!(ne.south, se.north);
            assert_eq!(nw.south, ne.south);
        }
    }

    #[test]
    fn test_lat_lng_to_tile_known_location() {
        // Albuquerque area, zoom 12.
        let t = lat_lng_to_tile(35.0, -106.0, 12);
        assert_eq!(t, TileAddress::new(841, 1622, 12));
        let b = t.bounds();
        assert!(b.contains(35.0, -106.0));
    }

    #[test]
    fn test_lat_lng_to_tile_clamps_polar_latitudes() {
        let t = lat_lng_to_tile(89.9, 0.0, 3);
        assert_eq!(t.y, 0);
        let t = lat_lng_to_tile(-89.9, 0.0, 3);
        assert_eq!(t.y, 7);
    }

    #[test]
    fn test_fractional_tile_roundtrip() {
        let y = lat_to_tile_y(42.5, 9);
        assert!((tile_y_to_lat(y, 9) - 42.5).abs() < 1e-9);
        let x = lon_to_tile_x(-71.25, 9);
        assert!((tile_x_to_lon(x, 9) + 71.25).abs() < 1e-9);
    }

    #[test]
    fn test_contains() {
        let parent = TileAddress::new(1, 1, 1);
        assert!(parent.contains(&parent));
        assert!(parent.contains(&TileAddress::new(3, 2, 2)));
        assert!(!parent.contains(&TileAddress::new(0, 2, 2)));
        assert!(!parent.contains(&TileAddress::root()));
    }

    #[test]
    fn test_try_new_rejects_out_of_range() {
        assert_eq!(
            TileAddress::try_new(4, 0, 2),
            Err(GeoError::OutOfRange { x: 4, y: 0, z: 2 })
        );
        assert_eq!(TileAddress::try_new(0, 0, 31), Err(GeoError::ZoomOutOfRange(31)));
        assert!(TileAddress::try_new(3, 3, 2).is_ok());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_new_panics_out_of_range() {
        let _ = TileAddress::new(0, 8, 3);
    }

    #[test]
    fn test_root_has_no_parent_and_max_zoom_has_no_children() {
        assert!(TileAddress::root().parent().is_none());
        let deepest = TileAddress::new(0, 0, TileAddress::MAX_ZOOM);
        assert!(deepest.children().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(TileAddress::new(3, 4, 5).to_string(), "[x:3,y:4,z:5]");
    }
}
