//! Arena-backed tile quadtree.
//!
//! Nodes live in a [`Slab`] and refer to each other by [`NodeKey`]; the
//! parent owns its children's slots and children hold a plain key back to the
//! parent. Splits are two-phase ([`TileTree::begin_split`] hands out build
//! requests, [`TileTree::complete_split`] installs the results) so the builds
//! can run on worker threads while the tree stays single-owner.

use std::fmt::Write as _;
use std::sync::Arc;

use relief_elevation::ElevationGrid;
use relief_geo::{GlobeReference, TileAddress};
use slab::Slab;
use tracing::{debug, warn};

use crate::{
    BuildError, BuildRequest, BuiltTile, CompactId, NodeKey, Registry, Scene, TileBuilder,
    TileNode, TreeError,
};

/// Consecutive failed rebuilds after which a leaf is no longer offered as
/// stale until the error or frame changes.
pub const MAX_REBUILD_ATTEMPTS: u32 = 3;

/// Static parameters of a [`TileTree`].
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub root: TileAddress,
    pub max_zoom: u8,
    /// RTIN height error in meters.
    pub simplification_error: f32,
    /// Upper bound on simultaneously live tiles.
    pub id_capacity: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root: TileAddress::root(),
            max_zoom: 14,
            simplification_error: 1.0,
            id_capacity: CompactId::LIMIT - 1,
        }
    }
}

/// Result of [`TileTree::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// A node with exactly the requested address.
    Exact(NodeKey),
    /// The deepest existing node containing the requested address.
    Ancestor(NodeKey),
}

impl Lookup {
    pub fn key(self) -> NodeKey {
        match self {
            Lookup::Exact(key) | Lookup::Ancestor(key) => key,
        }
    }
}

/// Work handed out by [`TileTree::begin_split`]: one build per child, in
/// child order. Must be returned to [`TileTree::complete_split`].
#[derive(Debug)]
pub struct SplitTicket {
    pub parent: NodeKey,
    pub requests: Vec<BuildRequest>,
}

pub struct TileTree {
    nodes: Slab<TileNode>,
    root: NodeKey,
    registry: Registry,
    builder: TileBuilder,
    frame: GlobeReference,
    scene: Box<dyn Scene>,
    error: f32,
    max_zoom: u8,
    epoch: u64,
}

impl TileTree {
    /// Create a tree holding only the root, without geometry. Call
    /// [`Self::rebuild_all`] (or let a scheduler do it) to build it.
    pub fn new(
        config: &TreeConfig,
        builder: TileBuilder,
        frame: GlobeReference,
        scene: Box<dyn Scene>,
    ) -> Result<Self, TreeError> {
        let mut registry = Registry::with_capacity(config.id_capacity);
        let id = registry.reserve(1)?[0];
        let mut nodes = Slab::new();
        let root = NodeKey(nodes.insert(TileNode::new(config.root, None, id, config.max_zoom)));
        registry.bind(id, root);

        Ok(Self {
            nodes,
            root,
            registry,
            builder,
            frame,
            scene,
            error: config.simplification_error,
            max_zoom: config.max_zoom,
            epoch: 0,
        })
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn node(&self, key: NodeKey) -> Option<&TileNode> {
        self.nodes.get(key.0)
    }

    fn node_ref(&self, key: NodeKey) -> Result<&TileNode, TreeError> {
        self.nodes.get(key.0).ok_or(TreeError::UnknownNode(key))
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut TileNode, TreeError> {
        self.nodes.get_mut(key.0).ok_or(TreeError::UnknownNode(key))
    }

    /// Node currently holding `id`.
    pub fn node_by_id(&self, id: CompactId) -> Option<NodeKey> {
        self.registry.lookup(id)
    }

    /// Number of live nodes, internal ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn builder(&self) -> &TileBuilder {
        &self.builder
    }

    pub fn frame(&self) -> &GlobeReference {
        &self.frame
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    pub fn simplification_error(&self) -> f32 {
        self.error
    }

    /// Change the RTIN error. Existing geometry becomes stale and is picked
    /// up by [`Self::stale_leaves`].
    pub fn set_simplification_error(&mut self, error: f32) {
        if error != self.error {
            debug!(from = self.error, to = error, "simplification error changed");
            self.error = error;
            self.reset_rebuild_failures();
        }
    }

    /// Re-anchor the local frame. All geometry is invalidated, including
    /// builds still in flight for the previous frame.
    pub fn set_frame(&mut self, frame: GlobeReference) {
        self.frame = frame;
        self.epoch += 1;
        for (_, node) in self.nodes.iter_mut() {
            node.last_error = None;
            node.rebuild_failures = 0;
        }
        debug!(anchor = %self.frame.address(), "frame changed");
    }

    fn reset_rebuild_failures(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.rebuild_failures = 0;
        }
    }

    fn request_for(
        &self,
        address: TileAddress,
        id: CompactId,
        elevation: Option<Arc<ElevationGrid>>,
    ) -> BuildRequest {
        BuildRequest {
            address,
            id,
            elevation,
            error: self.error,
            matrix: self.frame.matrix(),
            epoch: self.epoch,
        }
    }

    // -----------------------------------------------------------------------
    // Scene bookkeeping
    // -----------------------------------------------------------------------

    fn attach(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get_mut(key.0) else {
            return;
        };
        if node.attached || node.children.is_some() {
            return;
        }
        if let Some(geometry) = &node.geometry {
            self.scene.attach(node.id, node.address, geometry);
            node.attached = true;
        }
    }

    fn detach(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get_mut(key.0) else {
            return;
        };
        if node.attached {
            self.scene.detach(node.id, node.address);
            node.attached = false;
        }
    }

    // -----------------------------------------------------------------------
    // Split
    // -----------------------------------------------------------------------

    /// Reserve ids for the four children of `key` and mark it busy.
    ///
    /// Nothing visible changes until [`Self::complete_split`].
    pub fn begin_split(&mut self, key: NodeKey) -> Result<SplitTicket, TreeError> {
        let node = self.node_ref(key)?;
        let address = node.address;
        if node.children.is_some() {
            return Err(TreeError::InvariantViolation(format!(
                "{address} is already split"
            )));
        }
        if node.busy {
            return Err(TreeError::NodeBusy(address));
        }
        let cannot_split = TreeError::CannotSplit {
            address,
            max_zoom: node.max_zoom,
        };
        if !node.can_split() {
            return Err(cannot_split);
        }
        let Some(children) = address.children() else {
            return Err(cannot_split);
        };

        let ids = self.registry.reserve(4).inspect_err(|err| {
            warn!(x = address.x, y = address.y, z = address.z, error = %err, "split refused");
        })?;
        let requests = children
            .iter()
            .zip(ids)
            .map(|(child, id)| self.request_for(*child, id, None))
            .collect();
        self.node_mut(key)?.busy = true;
        Ok(SplitTicket {
            parent: key,
            requests,
        })
    }

    /// Install the children built for `ticket`, or roll the split back if
    /// any build failed.
    ///
    /// On failure the reserved ids are released and the parent's maximum
    /// zoom is clamped to its own level so the split is not retried.
    pub fn complete_split(
        &mut self,
        ticket: SplitTicket,
        results: Vec<Result<BuiltTile, BuildError>>,
    ) -> Result<[NodeKey; 4], TreeError> {
        let SplitTicket { parent, requests } = ticket;
        let release_all = |registry: &mut Registry| {
            for request in &requests {
                registry.release(request.id);
            }
        };

        let Some(node) = self.nodes.get_mut(parent.0) else {
            release_all(&mut self.registry);
            return Err(TreeError::UnknownNode(parent));
        };
        node.busy = false;
        let address = node.address;

        let mut built = Vec::with_capacity(4);
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(tile) => built.push(tile),
                Err(source) => {
                    if !matches!(source, BuildError::Cancelled(_)) {
                        node.max_zoom = address.z;
                    }
                    release_all(&mut self.registry);
                    warn!(
                        x = address.x,
                        y = address.y,
                        z = address.z,
                        child = %request.address,
                        error = %source,
                        "split rolled back"
                    );
                    return Err(TreeError::Build {
                        address: request.address,
                        source,
                    });
                }
            }
        }
        if built.len() != 4 {
            release_all(&mut self.registry);
            return Err(TreeError::InvariantViolation(format!(
                "split of {address} produced {} children",
                built.len()
            )));
        }

        let max_zoom = node.max_zoom;
        let mut keys = [parent; 4];
        for (slot, tile) in keys.iter_mut().zip(built) {
            let mut child = TileNode::new(tile.address, Some(parent), tile.id, max_zoom);
            child.last_error = (tile.epoch == self.epoch).then_some(tile.error);
            child.elevation = Some(tile.elevation);
            child.geometry = Some(tile.geometry);
            let key = NodeKey(self.nodes.insert(child));
            self.registry.bind(tile.id, key);
            *slot = key;
        }

        self.detach(parent);
        self.node_mut(parent)?.children = Some(keys);
        for key in keys {
            self.attach(key);
        }
        debug!(x = address.x, y = address.y, z = address.z, "split");
        Ok(keys)
    }

    /// Split `key` and build its children on the calling thread. Returns the
    /// existing children if the node is already split.
    pub fn split(&mut self, key: NodeKey) -> Result<[NodeKey; 4], TreeError> {
        if let Some(children) = self.node_ref(key)?.children {
            return Ok(children);
        }
        let ticket = self.begin_split(key)?;
        let mut results = Vec::with_capacity(4);
        for request in &ticket.requests {
            let result = self.builder.build(request);
            let failed = result.is_err();
            results.push(result);
            if failed {
                break;
            }
        }
        self.complete_split(ticket, results)
    }

    // -----------------------------------------------------------------------
    // Merge / removal
    // -----------------------------------------------------------------------

    fn ensure_idle(&self, key: NodeKey) -> Result<(), TreeError> {
        for k in std::iter::once(key).chain(self.all_nodes_below(key)) {
            let node = self.node_ref(k)?;
            if node.busy {
                debug_assert!(false, "removing {} while it is busy", node.address);
                return Err(TreeError::NodeBusy(node.address));
            }
        }
        Ok(())
    }

    fn destroy_subtree(&mut self, key: NodeKey) {
        let mut doomed = self.all_nodes_below(key);
        doomed.push(key);
        for k in doomed {
            self.detach(k);
            if let Some(node) = self.nodes.try_remove(k.0) {
                self.registry.release(node.id);
            }
        }
    }

    /// Destroy every descendant of `key` and show its own geometry again.
    /// A leaf is left untouched.
    ///
    /// Fatal in debug builds if any affected node is busy.
    pub fn merge(&mut self, key: NodeKey) -> Result<(), TreeError> {
        let Some(children) = self.node_ref(key)?.children else {
            return Ok(());
        };
        self.ensure_idle(key)?;
        for child in children {
            self.destroy_subtree(child);
        }
        let node = self.node_mut(key)?;
        node.children = None;
        let address = node.address;
        self.attach(key);
        debug!(x = address.x, y = address.y, z = address.z, "merged");
        Ok(())
    }

    /// Remove `key` together with its siblings by merging their parent.
    ///
    /// A parent keeps either zero or four children, so a single child cannot
    /// go on its own; the parent becomes a leaf again and is re-attached.
    /// Removing the root is an invariant violation.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<(), TreeError> {
        let node = self.node_ref(key)?;
        let Some(parent) = node.parent else {
            return Err(TreeError::InvariantViolation(
                "the root cannot be removed".to_string(),
            ));
        };
        self.ensure_idle(key)?;
        self.merge(parent)
    }

    // -----------------------------------------------------------------------
    // Geometry rebuilds
    // -----------------------------------------------------------------------

    /// Leaves whose geometry is missing or was built for another error or
    /// frame, skipping busy ones and ones that failed
    /// [`MAX_REBUILD_ATTEMPTS`] times in a row.
    pub fn stale_leaves(&self) -> Vec<NodeKey> {
        let error = self.error;
        self.collect(self.root, true, |node| {
            node.is_leaf()
                && !node.busy
                && node.rebuild_failures < MAX_REBUILD_ATTEMPTS
                && node.needs_update(error)
        })
    }

    /// Mark `key` busy and describe the build that refreshes its geometry.
    pub fn begin_rebuild(&mut self, key: NodeKey) -> Result<BuildRequest, TreeError> {
        let node = self.node_ref(key)?;
        if node.busy {
            return Err(TreeError::NodeBusy(node.address));
        }
        let request = self.request_for(node.address, node.id, node.elevation.clone());
        self.node_mut(key)?.busy = true;
        Ok(request)
    }

    /// Swap in rebuilt geometry for `key`.
    pub fn complete_rebuild(
        &mut self,
        key: NodeKey,
        result: Result<BuiltTile, BuildError>,
    ) -> Result<(), TreeError> {
        let epoch = self.epoch;
        let node = self.node_mut(key)?;
        node.busy = false;
        let tile = match result {
            Ok(tile) => tile,
            Err(source) => {
                let address = node.address;
                node.rebuild_failures += 1;
                let attempts = node.rebuild_failures;
                warn!(x = address.x, y = address.y, z = address.z, attempts, error = %source, "rebuild failed");
                return Err(TreeError::Build { address, source });
            }
        };
        node.rebuild_failures = 0;
        node.last_error = (tile.epoch == epoch).then_some(tile.error);
        node.elevation = Some(tile.elevation);
        node.geometry = Some(tile.geometry);
        self.detach(key);
        self.attach(key);
        Ok(())
    }

    /// Rebuild one node's geometry on the calling thread.
    pub fn rebuild_geometry(&mut self, key: NodeKey) -> Result<(), TreeError> {
        let request = self.begin_rebuild(key)?;
        let result = self.builder.build(&request);
        self.complete_rebuild(key, result)
    }

    /// Rebuild every stale leaf on the calling thread. Failures are logged
    /// and skipped; returns how many leaves were rebuilt.
    pub fn rebuild_all(&mut self) -> usize {
        let mut rebuilt = 0;
        for key in self.stale_leaves() {
            match self.rebuild_geometry(key) {
                Ok(()) => rebuilt += 1,
                Err(err) => debug!(node = %key, error = %err, "leaf left stale"),
            }
        }
        rebuilt
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Depth-first, children in quadrant order.
    fn collect(
        &self,
        start: NodeKey,
        include_start: bool,
        keep: impl Fn(&TileNode) -> bool,
    ) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key.0) else {
                continue;
            };
            if (include_start || key != start) && keep(node) {
                out.push(key);
            }
            if let Some(children) = node.children {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    pub fn leaf_nodes(&self) -> Vec<NodeKey> {
        self.collect(self.root, true, TileNode::is_leaf)
    }

    pub fn non_leaf_nodes(&self) -> Vec<NodeKey> {
        self.collect(self.root, true, |node| !node.is_leaf())
    }

    /// Every descendant of `key`, excluding `key` itself.
    pub fn all_nodes_below(&self, key: NodeKey) -> Vec<NodeKey> {
        self.collect(key, false, |_| true)
    }

    /// The children of `key`'s parent (including `key`); empty for the root.
    pub fn siblings(&self, key: NodeKey) -> Vec<NodeKey> {
        self.node(key)
            .and_then(|node| node.parent)
            .and_then(|parent| self.node(parent))
            .and_then(|parent| parent.children)
            .map(|children| children.to_vec())
            .unwrap_or_default()
    }

    /// Find the node for `address`, or its deepest existing ancestor. `None`
    /// when the address lies outside the root.
    pub fn lookup(&self, address: TileAddress) -> Option<Lookup> {
        let mut key = self.root;
        let mut node = self.node(key)?;
        if !node.address.contains(&address) {
            return None;
        }
        while node.address.z < address.z {
            let Some(children) = node.children else {
                return Some(Lookup::Ancestor(key));
            };
            let shift = u32::from(address.z - node.address.z - 1);
            let quadrant = ((address.y >> shift) & 1) * 2 + ((address.x >> shift) & 1);
            key = children[quadrant as usize];
            node = self.node(key)?;
        }
        Some(Lookup::Exact(key))
    }

    /// Lowest and highest elevation across leaf geometry.
    pub fn elevation_range(&self) -> Option<(f32, f32)> {
        self.leaf_nodes()
            .into_iter()
            .filter_map(|key| self.node(key)?.geometry.as_ref())
            .map(|g| (g.min_elevation, g.max_elevation))
            .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)))
    }

    /// Indented dump of the whole tree, one node per line.
    pub fn to_full_string(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((key, depth)) = stack.pop() {
            let Some(node) = self.node(key) else {
                continue;
            };
            let _ = writeln!(out, "{:indent$}{node}", "", indent = depth * 2);
            if let Some(children) = node.children {
                stack.extend(children.iter().rev().map(|&c| (c, depth + 1)));
            }
        }
        out
    }
}

impl std::fmt::Display for TileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_full_string())
    }
}

impl std::fmt::Debug for TileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileTree")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("error", &self.error)
            .field("max_zoom", &self.max_zoom)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
