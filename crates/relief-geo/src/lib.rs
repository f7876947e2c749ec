//! Geodesy for the terrain engine: WGS84 ellipsoid conversions, slippy-tile
//! addressing, geographic bounds, and the anchored globe reference frame.

mod bounds;
mod ellipsoid;
mod frame;
mod gsd;
mod tile_address;

pub use bounds::{GeoBounds, bounds_around, calculate_zoom};
pub use ellipsoid::{
    Geodetic, WGS84_A, WGS84_B, WGS84_F, ecef_to_lla, lla_to_ecef, normalize_lat_lon,
};
pub use frame::GlobeReference;
pub use gsd::{DEFAULT_GROUND_SAMPLE_DISTANCE, GroundSampleDistance};
pub use tile_address::{
    GeoError, TileAddress, lat_lng_to_tile, lat_to_tile_y, lon_to_tile_x, split_tile_coordinates,
    tile_bounds, tile_x_to_lon, tile_y_to_lat,
};
