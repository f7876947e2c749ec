//! Error types for tile building and tree mutation.

use relief_elevation::{FetchError, GridError};
use relief_geo::TileAddress;
use relief_mesh::MeshError;

use crate::NodeKey;

/// Failure to produce geometry for a single tile.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// The elevation raster could not be obtained.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The decoded raster has an unusable shape.
    #[error("malformed elevation grid for {address}: {source}")]
    Grid {
        address: TileAddress,
        #[source]
        source: GridError,
    },
    /// The grid could not be triangulated.
    #[error("cannot mesh {address}: {source}")]
    Mesh {
        address: TileAddress,
        #[source]
        source: MeshError,
    },
    /// The build was never run, e.g. because the worker pool shut down.
    #[error("build of {0} was cancelled")]
    Cancelled(TileAddress),
}

/// Failure of a quadtree operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// The node is already at its maximum zoom.
    #[error("{address} cannot split beyond zoom {max_zoom}")]
    CannotSplit { address: TileAddress, max_zoom: u8 },
    /// Not enough free compact ids for four new children.
    #[error("compact id space exhausted ({live} live tiles)")]
    IdsExhausted { live: usize },
    /// A tile failed to build; the split was rolled back.
    #[error("building {address} failed: {source}")]
    Build {
        address: TileAddress,
        #[source]
        source: BuildError,
    },
    /// The key does not name a live node.
    #[error("no node with key {0}")]
    UnknownNode(NodeKey),
    /// The node has a mutation in flight.
    #[error("{0} is busy")]
    NodeBusy(TileAddress),
    /// A structural rule of the tree would be broken.
    #[error("quadtree invariant violated: {0}")]
    InvariantViolation(String),
}
