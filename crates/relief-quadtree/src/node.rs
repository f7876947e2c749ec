//! Quadtree vertices.

use std::sync::Arc;

use relief_elevation::ElevationGrid;
use relief_geo::TileAddress;
use relief_mesh::TileGeometry;

use crate::CompactId;

/// Stable handle to a node in a [`crate::TileTree`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub(crate) usize);

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// One tile of the quadtree.
///
/// Structure (`parent`/`children`) is only changed by the owning tree; the
/// node itself holds the cached elevation and the most recent geometry.
#[derive(Debug)]
pub struct TileNode {
    pub(crate) address: TileAddress,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Option<[NodeKey; 4]>,
    pub(crate) elevation: Option<Arc<ElevationGrid>>,
    pub(crate) geometry: Option<Arc<TileGeometry>>,
    pub(crate) id: CompactId,
    pub(crate) busy: bool,
    pub(crate) last_error: Option<f32>,
    pub(crate) max_zoom: u8,
    pub(crate) rebuild_failures: u32,
    pub(crate) attached: bool,
}

impl TileNode {
    pub(crate) fn new(
        address: TileAddress,
        parent: Option<NodeKey>,
        id: CompactId,
        max_zoom: u8,
    ) -> Self {
        Self {
            address,
            parent,
            children: None,
            elevation: None,
            geometry: None,
            id,
            busy: false,
            last_error: None,
            max_zoom,
            rebuild_failures: 0,
            attached: false,
        }
    }

    pub fn address(&self) -> TileAddress {
        self.address
    }

    pub fn zoom(&self) -> u8 {
        self.address.z
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> Option<[NodeKey; 4]> {
        self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn id(&self) -> CompactId {
        self.id
    }

    /// Set while a fetch/simplify for this node is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn elevation(&self) -> Option<&Arc<ElevationGrid>> {
        self.elevation.as_ref()
    }

    pub fn geometry(&self) -> Option<&Arc<TileGeometry>> {
        self.geometry.as_ref()
    }

    /// Footprint outline of the current geometry, for debug overlays.
    pub fn bounding_box(&self) -> Option<&[glam::Vec3; 5]> {
        self.geometry.as_ref().map(|g| &g.bounding_box)
    }

    /// Simplification error the current geometry was built with.
    pub fn last_error(&self) -> Option<f32> {
        self.last_error
    }

    /// Deepest zoom this node may split to. Lowered to the node's own zoom
    /// after a failed split so it is not retried every cycle.
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Consecutive failed rebuilds since the last success or the last
    /// error/frame change.
    pub fn rebuild_failures(&self) -> u32 {
        self.rebuild_failures
    }

    pub fn can_split(&self) -> bool {
        self.address.z < self.max_zoom
    }

    /// Whether geometry must be (re)built for `error`.
    pub fn needs_update(&self, error: f32) -> bool {
        self.geometry.is_none() || self.last_error != Some(error)
    }
}

impl std::fmt::Display for TileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.address, self.id)?;
        if let Some(geometry) = &self.geometry {
            write!(f, " tris={}", geometry.triangle_count())?;
        }
        if self.busy {
            write!(f, " busy")?;
        }
        if !self.can_split() {
            write!(f, " max_zoom={}", self.max_zoom)?;
        }
        Ok(())
    }
}
