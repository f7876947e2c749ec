//! Fetch, decode, pad, simplify and project a single tile.
//!
//! A [`BuildRequest`] is a self-contained snapshot of everything one tile
//! build needs, so it can run on any thread without touching the tree.

use std::sync::Arc;

use glam::DMat4;
use relief_elevation::{ElevationGrid, ElevationSource, decode};
use relief_geo::TileAddress;
use relief_mesh::{MeshError, Rtin, TileGeometry, project};
use tracing::{debug, warn};

use crate::{BuildError, CompactId};

/// Inputs for one tile build.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub address: TileAddress,
    pub id: CompactId,
    /// Cached grid from an earlier build; fetched when `None`.
    pub elevation: Option<Arc<ElevationGrid>>,
    pub error: f32,
    pub matrix: DMat4,
    /// Frame generation the matrix belongs to.
    pub epoch: u64,
}

/// Output of a successful build.
#[derive(Clone, Debug)]
pub struct BuiltTile {
    pub address: TileAddress,
    pub id: CompactId,
    pub elevation: Arc<ElevationGrid>,
    pub geometry: Arc<TileGeometry>,
    pub error: f32,
    pub epoch: u64,
}

/// Turns tile addresses into geometry. Cheap to clone and shareable across
/// worker threads.
#[derive(Clone)]
pub struct TileBuilder {
    source: Arc<dyn ElevationSource>,
    rtin: Arc<Rtin>,
}

impl TileBuilder {
    pub fn new(source: Arc<dyn ElevationSource>, grid_size: u32) -> Result<Self, MeshError> {
        Ok(Self {
            source,
            rtin: Arc::new(Rtin::new(grid_size)?),
        })
    }

    pub fn grid_size(&self) -> u32 {
        self.rtin.grid_size()
    }

    /// Fetch and decode a tile, then pad (and if needed resample) it to the
    /// triangulation's grid size.
    pub fn load_elevation(&self, address: &TileAddress) -> Result<ElevationGrid, BuildError> {
        let image = self.source.fetch(address).inspect_err(|err| {
            warn!(x = address.x, y = address.y, z = address.z, error = %err, "elevation fetch failed");
        })?;
        let grid_error = |source| BuildError::Grid {
            address: *address,
            source,
        };
        let mut grid = decode(&image).and_then(|g| g.pad()).map_err(grid_error)?;
        if grid.size() != self.grid_size() {
            grid = grid.resample(self.grid_size()).map_err(grid_error)?;
        }
        Ok(grid)
    }

    /// Run a build request to completion.
    pub fn build(&self, request: &BuildRequest) -> Result<BuiltTile, BuildError> {
        let address = request.address;
        let elevation = match &request.elevation {
            Some(grid) => Arc::clone(grid),
            None => Arc::new(self.load_elevation(&address)?),
        };

        let mesh = self
            .rtin
            .create_tile(&elevation)
            .map_err(|source| BuildError::Mesh { address, source })?
            .mesh(request.error);
        let geometry = project(
            &mesh,
            &elevation,
            &address.bounds(),
            &request.matrix,
            u32::from(request.id),
        );
        debug!(
            x = address.x,
            y = address.y,
            z = address.z,
            id = request.id.get(),
            triangles = geometry.triangle_count(),
            "built tile"
        );

        Ok(BuiltTile {
            address,
            id: request.id,
            elevation,
            geometry: Arc::new(geometry),
            error: request.error,
            epoch: request.epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_elevation::{FetchError, MemoryTileSource, RawImage};

    fn request(address: TileAddress, elevation: Option<Arc<ElevationGrid>>) -> BuildRequest {
        BuildRequest {
            address,
            id: CompactId::from_raw(3).unwrap(),
            elevation,
            error: 1.0,
            matrix: DMat4::IDENTITY,
            epoch: 0,
        }
    }

    #[test]
    fn test_load_pads_to_grid_size() {
        let source = MemoryTileSource::uniform(RawImage::from_heights(16, |x, _| f64::from(x)));
        let builder = TileBuilder::new(Arc::new(source), 17).unwrap();
        let grid = builder.load_elevation(&TileAddress::root()).unwrap();
        assert_eq!(grid.size(), 17);
        assert_eq!(grid.get(16, 0), 16.0, "east column continues the slope");
    }

    #[test]
    fn test_load_resamples_when_sizes_differ() {
        let source = MemoryTileSource::uniform(RawImage::from_heights(32, |_, _| 50.0));
        let builder = TileBuilder::new(Arc::new(source), 17).unwrap();
        let grid = builder.load_elevation(&TileAddress::root()).unwrap();
        assert_eq!(grid.size(), 17);
        assert_eq!(grid.max(), 50.0);
    }

    #[test]
    fn test_build_reuses_cached_elevation() {
        let source = Arc::new(MemoryTileSource::uniform(RawImage::from_heights(16, |_, _| 5.0)));
        let builder = TileBuilder::new(source.clone(), 17).unwrap();
        let address = TileAddress::new(1, 1, 2);

        let first = builder.build(&request(address, None)).unwrap();
        assert_eq!(source.fetch_count(), 1);
        let second = builder
            .build(&request(address, Some(first.elevation.clone())))
            .unwrap();
        assert_eq!(source.fetch_count(), 1, "cached grid must not be refetched");
        assert!(Arc::ptr_eq(&first.elevation, &second.elevation));
        assert!(second.geometry.tile_ids.iter().all(|&id| id == 3));
    }

    #[test]
    fn test_build_surfaces_fetch_errors() {
        let source = MemoryTileSource::new();
        let builder = TileBuilder::new(Arc::new(source), 17).unwrap();
        let address = TileAddress::new(0, 0, 1);
        assert_eq!(
            builder.build(&request(address, None)).err(),
            Some(BuildError::Fetch(FetchError::NotFound(address)))
        );
    }
}
