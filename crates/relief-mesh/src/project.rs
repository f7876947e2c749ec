//! Projection of raster-space meshes into the anchored local frame.

use glam::{DMat4, DVec3, Vec3};
use relief_elevation::ElevationGrid;
use relief_geo::{GeoBounds, lla_to_ecef};

use crate::{SimplifiedMesh, SkirtGeometry, TileVertex, build_skirt};

/// Geographic position of a raster sample. `x` runs west→east and `y`
/// north→south; the last sample on each axis sits on the tile's east/south edge.
#[inline]
#[must_use]
pub fn raster_to_lat_lon(x: u32, y: u32, size: u32, bounds: &GeoBounds) -> (f64, f64) {
    let span = f64::from(size - 1);
    let lon = bounds.west + f64::from(x) / span * bounds.width();
    let lat = bounds.north - f64::from(y) / span * bounds.height();
    (lat, lon)
}

#[inline]
pub(crate) fn local_position(
    x: u32,
    y: u32,
    elevation: f32,
    size: u32,
    bounds: &GeoBounds,
    matrix: &DMat4,
) -> Vec3 {
    let (lat, lon) = raster_to_lat_lon(x, y, size, bounds);
    matrix
        .transform_point3(lla_to_ecef(lat, lon, f64::from(elevation)))
        .as_vec3()
}

/// Renderable geometry for one tile in local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileGeometry {
    pub positions: Vec<Vec3>,
    /// Source elevation of each vertex in meters.
    pub elevations: Vec<f32>,
    /// Compact id of the owning tile, repeated per vertex for feedback rendering.
    pub tile_ids: Vec<u32>,
    pub indices: Vec<u32>,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub skirt: SkirtGeometry,
    /// Closed outline of the tile footprint at elevation zero.
    pub bounding_box: [Vec3; 5],
}

impl TileGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Interleaved surface vertices for GPU upload.
    pub fn vertices(&self) -> Vec<TileVertex> {
        TileVertex::interleave(&self.positions, &self.elevations, &self.tile_ids)
    }

    /// Interleaved skirt vertices for GPU upload.
    pub fn skirt_vertices(&self) -> Vec<TileVertex> {
        TileVertex::interleave(
            &self.skirt.positions,
            &self.skirt.elevations,
            &self.skirt.tile_ids,
        )
    }
}

/// Project a simplified mesh through the ellipsoid and the anchor matrix,
/// attaching per-vertex elevation and tile id, the edge skirt, and the
/// footprint outline.
#[must_use]
pub fn project(
    mesh: &SimplifiedMesh,
    grid: &ElevationGrid,
    bounds: &GeoBounds,
    matrix: &DMat4,
    tile_id: u32,
) -> TileGeometry {
    let size = grid.size();
    let mut positions = Vec::with_capacity(mesh.vertices.len());
    let mut elevations = Vec::with_capacity(mesh.vertices.len());
    let mut min_elevation = f32::INFINITY;
    let mut max_elevation = f32::NEG_INFINITY;

    for &[mx, my] in &mesh.vertices {
        let (x, y) = (u32::from(mx), u32::from(my));
        let elevation = grid.get(x, y);
        min_elevation = min_elevation.min(elevation);
        max_elevation = max_elevation.max(elevation);
        positions.push(local_position(x, y, elevation, size, bounds, matrix));
        elevations.push(elevation);
    }
    if positions.is_empty() {
        min_elevation = 0.0;
        max_elevation = 0.0;
    }

    TileGeometry {
        tile_ids: vec![tile_id; positions.len()],
        positions,
        elevations,
        indices: mesh.triangles.clone(),
        min_elevation,
        max_elevation,
        skirt: build_skirt(grid, bounds, matrix, tile_id),
        bounding_box: bounding_box(bounds, matrix),
    }
}

/// Footprint outline: the south-west and north-east corners at elevation
/// zero, expanded into a closed axis-aligned loop on the local `z = 0` plane.
#[must_use]
pub fn bounding_box(bounds: &GeoBounds, matrix: &DMat4) -> [Vec3; 5] {
    let ll = matrix.transform_point3(lla_to_ecef(bounds.south, bounds.west, 0.0));
    let ur = matrix.transform_point3(lla_to_ecef(bounds.north, bounds.east, 0.0));
    [
        DVec3::new(ll.x, ll.y, 0.0),
        DVec3::new(ur.x, ll.y, 0.0),
        DVec3::new(ur.x, ur.y, 0.0),
        DVec3::new(ll.x, ur.y, 0.0),
        DVec3::new(ll.x, ll.y, 0.0),
    ]
    .map(|p| p.as_vec3())
}
