//! Right-triangulated irregular network (RTIN) simplification.
//!
//! A `(2^k + 1)²` height grid is covered by two right triangles that are
//! recursively bisected along their hypotenuse. Every bisection midpoint is
//! assigned an error: how far the true height there deviates from the
//! interpolated hypotenuse, maxed with the errors of its descendants. Meshing
//! at a threshold then only splits triangles whose midpoint error exceeds it,
//! which makes the output nested across thresholds.

use relief_elevation::ElevationGrid;

/// Grid shape problems that make RTIN impossible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    /// RTIN needs a side length of `2^k + 1`.
    #[error("grid size {0} is not 2^k + 1")]
    InvalidGridSize(u32),
    /// The grid handed to a tile does not match the triangulation it was built for.
    #[error("expected a grid of side {expected}, got {actual}")]
    GridMismatch { expected: u32, actual: u32 },
}

/// Precomputed triangle hierarchy for one grid size. Independent of heights,
/// so a single instance serves every tile.
#[derive(Clone, Debug)]
pub struct Rtin {
    grid_size: u32,
    num_triangles: usize,
    num_parent_triangles: usize,
    /// `[ax, ay, bx, by]` hypotenuse endpoints of every triangle, in
    /// breadth-first bisection order.
    coords: Vec<u16>,
}

impl Rtin {
    /// Largest supported side length; keeps coordinate sums within `u16`.
    pub const MAX_GRID_SIZE: u32 = 16_385;

    pub fn new(grid_size: u32) -> Result<Self, MeshError> {
        let tile_size = grid_size.wrapping_sub(1);
        if grid_size < 3 || !tile_size.is_power_of_two() || grid_size > Self::MAX_GRID_SIZE {
            return Err(MeshError::InvalidGridSize(grid_size));
        }
        let tile = tile_size as usize;
        let num_triangles = tile * tile * 2 - 2;
        let num_parent_triangles = num_triangles - tile * tile;
        let edge = tile_size as u16;

        let mut coords = vec![0u16; num_triangles * 4];
        for i in 0..num_triangles {
            let mut id = i + 2;
            let (mut ax, mut ay, mut bx, mut by, mut cx, mut cy) = (0u16, 0u16, 0u16, 0u16, 0u16, 0u16);
            if id & 1 == 1 {
                // bottom-left
                bx = edge;
                by = edge;
                cx = edge;
            } else {
                // top-right
                ax = edge;
                ay = edge;
                cy = edge;
            }
            loop {
                id >>= 1;
                if id <= 1 {
                    break;
                }
                let mx = (ax + bx) >> 1;
                let my = (ay + by) >> 1;
                if id & 1 == 1 {
                    bx = ax;
                    by = ay;
                    ax = cx;
                    ay = cy;
                } else {
                    ax = bx;
                    ay = by;
                    bx = cx;
                    by = cy;
                }
                cx = mx;
                cy = my;
            }
            coords[i * 4..i * 4 + 4].copy_from_slice(&[ax, ay, bx, by]);
        }

        Ok(Self {
            grid_size,
            num_triangles,
            num_parent_triangles,
            coords,
        })
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Compute the error pyramid for one height grid.
    pub fn create_tile(&self, grid: &ElevationGrid) -> Result<RtinTile<'_>, MeshError> {
        if grid.size() != self.grid_size {
            return Err(MeshError::GridMismatch {
                expected: self.grid_size,
                actual: grid.size(),
            });
        }
        let size = self.grid_size as usize;
        let terrain = grid.heights();
        let mut errors = vec![0.0f32; terrain.len()];

        for i in (0..self.num_triangles).rev() {
            let k = i * 4;
            let ax = usize::from(self.coords[k]);
            let ay = usize::from(self.coords[k + 1]);
            let bx = usize::from(self.coords[k + 2]);
            let by = usize::from(self.coords[k + 3]);
            let mx = (ax + bx) >> 1;
            let my = (ay + by) >> 1;
            let cx = mx + my - ay;
            let cy = my + ax - mx;

            let interpolated = (terrain[ay * size + ax] + terrain[by * size + bx]) / 2.0;
            let middle = my * size + mx;
            let middle_error = (interpolated - terrain[middle]).abs();
            errors[middle] = errors[middle].max(middle_error);

            if i < self.num_parent_triangles {
                let left = ((ay + cy) >> 1) * size + ((ax + cx) >> 1);
                let right = ((by + cy) >> 1) * size + ((bx + cx) >> 1);
                errors[middle] = errors[middle].max(errors[left]).max(errors[right]);
            }
        }

        Ok(RtinTile { rtin: self, errors })
    }
}

/// Error pyramid for one height grid, ready to mesh at any threshold.
pub struct RtinTile<'a> {
    rtin: &'a Rtin,
    errors: Vec<f32>,
}

/// An indexed triangle list in raster coordinates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimplifiedMesh {
    /// `[x, y]` grid positions of the retained vertices.
    pub vertices: Vec<[u16; 2]>,
    /// Three vertex indices per triangle.
    pub triangles: Vec<u32>,
}

impl SimplifiedMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }
}

struct Mesher<'a> {
    errors: &'a [f32],
    size: usize,
    max_error: f32,
    refine_all: bool,
    indices: Vec<u32>,
    mesh: SimplifiedMesh,
}

impl Mesher<'_> {
    #[inline]
    fn should_split(&self, ax: u16, ay: u16, bx: u16, by: u16, cx: u16, cy: u16) -> bool {
        let long = ax.abs_diff(cx) + ay.abs_diff(cy) > 1;
        if !long {
            return false;
        }
        let mx = usize::from((ax + bx) >> 1);
        let my = usize::from((ay + by) >> 1);
        self.refine_all || self.errors[my * self.size + mx] > self.max_error
    }

    fn vertex(&mut self, x: u16, y: u16) -> u32 {
        let slot = usize::from(y) * self.size + usize::from(x);
        if self.indices[slot] == 0 {
            self.mesh.vertices.push([x, y]);
            self.indices[slot] = self.mesh.vertices.len() as u32;
        }
        self.indices[slot] - 1
    }

    fn process(&mut self, ax: u16, ay: u16, bx: u16, by: u16, cx: u16, cy: u16) {
        if self.should_split(ax, ay, bx, by, cx, cy) {
            let mx = (ax + bx) >> 1;
            let my = (ay + by) >> 1;
            self.process(cx, cy, ax, ay, mx, my);
            self.process(bx, by, cx, cy, mx, my);
        } else {
            let a = self.vertex(ax, ay);
            let b = self.vertex(bx, by);
            let c = self.vertex(cx, cy);
            self.mesh.triangles.extend_from_slice(&[a, b, c]);
        }
    }
}

impl RtinTile<'_> {
    /// Mesh the tile, splitting every triangle whose midpoint error exceeds
    /// `max_error`. A threshold of zero or less refines to full grid resolution.
    #[must_use]
    pub fn mesh(&self, max_error: f32) -> SimplifiedMesh {
        let size = self.rtin.grid_size as usize;
        let max = (self.rtin.grid_size - 1) as u16;
        let mut mesher = Mesher {
            errors: &self.errors,
            size,
            max_error,
            refine_all: max_error <= 0.0,
            indices: vec![0; size * size],
            mesh: SimplifiedMesh::default(),
        };
        mesher.process(0, 0, max, max, max, 0);
        mesher.process(max, max, 0, 0, 0, max);
        mesher.mesh
    }

    /// Accumulated error at a grid position.
    pub fn error_at(&self, x: u32, y: u32) -> f32 {
        self.errors[(y as usize) * (self.rtin.grid_size as usize) + x as usize]
    }
}

/// One-shot simplification of a grid at `error` meters.
pub fn simplify(grid: &ElevationGrid, error: f32) -> Result<SimplifiedMesh, MeshError> {
    let rtin = Rtin::new(grid.size())?;
    Ok(rtin.create_tile(grid)?.mesh(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bumpy(size: u32) -> ElevationGrid {
        ElevationGrid::from_fn(size, |x, y| {
            let (fx, fy) = (x as f32 * 0.21, y as f32 * 0.17);
            (fx.sin() * 40.0 + fy.cos() * 25.0 + (fx * fy * 0.05).sin() * 10.0).round()
        })
    }

    #[test]
    fn test_rejects_bad_grid_sizes() {
        for size in [0, 1, 2, 4, 256, 258, 32_769] {
            assert_eq!(Rtin::new(size).err(), Some(MeshError::InvalidGridSize(size)));
        }
        assert!(Rtin::new(257).is_ok());
        assert!(Rtin::new(3).is_ok());
    }

    #[test]
    fn test_create_tile_checks_size() {
        let rtin = Rtin::new(17).unwrap();
        let grid = ElevationGrid::flat(33, 0.0);
        assert_eq!(
            rtin.create_tile(&grid).err(),
            Some(MeshError::GridMismatch {
                expected: 17,
                actual: 33
            })
        );
    }

    #[test]
    fn test_flat_grid_is_two_triangles() {
        let mesh = simplify(&ElevationGrid::flat(257, 100.0), 1.0).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_zero_error_is_full_resolution() {
        let mesh = simplify(&ElevationGrid::flat(257, 0.0), 0.0).unwrap();
        assert_eq!(mesh.triangle_count(), 2 * 256 * 256);
        assert_eq!(mesh.vertex_count(), 257 * 257);
    }

    #[test]
    fn test_triangle_count_monotone_in_error() {
        let grid = bumpy(65);
        let rtin = Rtin::new(65).unwrap();
        let tile = rtin.create_tile(&grid).unwrap();
        let mut previous = usize::MAX;
        for error in [0.0, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 200.0] {
            let count = tile.mesh(error).triangle_count();
            assert!(
                count <= previous,
                "error {error} produced {count} triangles, more than {previous}"
            );
            previous = count;
        }
        assert_eq!(tile.mesh(200.0).triangle_count(), 2);
    }

    #[test]
    fn test_triangles_cover_the_grid() {
        let grid = bumpy(33);
        let mesh = simplify(&grid, 4.0).unwrap();
        let area: f32 = mesh
            .triangles
            .chunks_exact(3)
            .map(|tri| {
                let [a, b, c] = [0, 1, 2].map(|k| {
                    let [x, y] = mesh.vertices[tri[k] as usize];
                    (f32::from(x), f32::from(y))
                });
                ((b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1)).abs() / 2.0
            })
            .sum();
        assert_eq!(area, 32.0 * 32.0);
    }

    #[test]
    fn test_corner_errors_are_zero() {
        let grid = bumpy(17);
        let rtin = Rtin::new(17).unwrap();
        let tile = rtin.create_tile(&grid).unwrap();
        assert_eq!(tile.error_at(0, 0), 0.0);
        assert_eq!(tile.error_at(16, 16), 0.0);
    }
}
