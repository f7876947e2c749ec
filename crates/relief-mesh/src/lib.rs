//! Adaptive mesh generation for elevation tiles: RTIN simplification in
//! raster space, projection into the anchored local frame, edge skirts, and
//! GPU vertex packing.

mod project;
mod rtin;
mod skirt;
mod vertex;

pub use project::{TileGeometry, bounding_box, project, raster_to_lat_lon};
pub use rtin::{MeshError, Rtin, RtinTile, SimplifiedMesh, simplify};
pub use skirt::{SkirtGeometry, build_skirt};
pub use vertex::TileVertex;
