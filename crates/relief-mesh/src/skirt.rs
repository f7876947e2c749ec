//! Vertical ribbons along tile edges that hide cracks between neighbouring
//! tiles meshed at different zoom levels.

use glam::{DMat4, Vec3};
use relief_elevation::ElevationGrid;
use relief_geo::GeoBounds;

use crate::project::local_position;

/// Edge ribbons of one tile: a surface vertex and a floor vertex (elevation
/// zero) for every grid sample on the border.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkirtGeometry {
    pub positions: Vec<Vec3>,
    pub elevations: Vec<f32>,
    pub tile_ids: Vec<u32>,
    pub indices: Vec<u32>,
}

impl SkirtGeometry {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Grid positions along the four edges, walked counter-clockwise as seen from
/// above: south west→east, east south→north, north east→west, west north→south.
fn edges(size: u32) -> [Vec<(u32, u32)>; 4] {
    let max = size - 1;
    [
        (0..size).map(|x| (x, max)).collect(),
        (0..size).rev().map(|y| (max, y)).collect(),
        (0..size).rev().map(|x| (x, 0)).collect(),
        (0..size).map(|y| (0, y)).collect(),
    ]
}

/// Build the skirt for a tile.
///
/// Each edge becomes a strip of quads `(top_i, bottom_i, top_i+1)`,
/// `(top_i+1, bottom_i, bottom_i+1)`, so front faces point away from the tile.
pub fn build_skirt(
    grid: &ElevationGrid,
    bounds: &GeoBounds,
    matrix: &DMat4,
    tile_id: u32,
) -> SkirtGeometry {
    let size = grid.size();
    let mut skirt = SkirtGeometry::default();
    if size < 2 {
        return skirt;
    }

    for edge in edges(size) {
        let base = skirt.positions.len() as u32;
        for &(x, y) in &edge {
            let elevation = grid.get(x, y);
            for h in [elevation, 0.0] {
                skirt
                    .positions
                    .push(local_position(x, y, h, size, bounds, matrix));
                skirt.elevations.push(h);
                skirt.tile_ids.push(tile_id);
            }
        }
        for i in 0..(edge.len() as u32 - 1) {
            let top = base + i * 2;
            let bottom = top + 1;
            let next_top = top + 2;
            let next_bottom = top + 3;
            skirt
                .indices
                .extend_from_slice(&[top, bottom, next_top, next_top, bottom, next_bottom]);
        }
    }
    skirt
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_geo::{GlobeReference, TileAddress};

    #[test]
    fn test_skirt_counts() {
        let address = TileAddress::new(204, 401, 10);
        let frame = GlobeReference::new(address, 1.0);
        let grid = ElevationGrid::flat(17, 500.0);
        let skirt = build_skirt(&grid, &address.bounds(), &frame.matrix(), 9);
        assert_eq!(skirt.positions.len(), 4 * 17 * 2);
        assert_eq!(skirt.triangle_count(), 4 * 16 * 2);
        assert!(skirt.tile_ids.iter().all(|&id| id == 9));
        assert_eq!(skirt.elevations.iter().filter(|&&h| h == 0.0).count(), 4 * 17);
    }

    #[test]
    fn test_skirt_faces_point_outward() {
        let address = TileAddress::new(204, 401, 10);
        let frame = GlobeReference::new(address, 1.0);
        let bounds = address.bounds();
        let grid = ElevationGrid::from_fn(9, |x, y| 1500.0 + (x * 20 + y * 7) as f32);
        let skirt = build_skirt(&grid, &bounds, &frame.matrix(), 1);

        let (lat, lon) = bounds.center();
        let center = frame.to_local(lat, lon, 0.0).as_vec3();

        for tri in skirt.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| skirt.positions[tri[k] as usize]);
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            let outward = centroid - center;
            assert!(
                normal.dot(outward) > 0.0,
                "triangle {tri:?} faces inward"
            );
        }
    }
}
