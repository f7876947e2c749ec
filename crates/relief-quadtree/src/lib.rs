//! Tile quadtree: an arena of [`TileNode`]s keyed by [`NodeKey`], the compact
//! id [`Registry`] that names live tiles in feedback images, the
//! [`TileBuilder`] that turns addresses into geometry, and the [`Scene`] sink
//! that receives leaf geometry.

mod builder;
mod error;
mod node;
mod registry;
mod scene;
mod tree;

pub use builder::{BuildRequest, BuiltTile, TileBuilder};
pub use error::{BuildError, TreeError};
pub use node::{NodeKey, TileNode};
pub use registry::{CompactId, Registry};
pub use scene::{NullScene, RecordingScene, Scene, SceneEvent};
pub use tree::{Lookup, MAX_REBUILD_ATTEMPTS, SplitTicket, TileTree, TreeConfig};
