//! Sink for geometry entering and leaving the rendered scene.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use relief_geo::TileAddress;
use relief_mesh::TileGeometry;

use crate::CompactId;

/// Receives leaf geometry as the tree changes shape.
///
/// A tile is attached while it is a leaf with geometry and detached when it
/// is split, destroyed, or its geometry is replaced.
pub trait Scene: Send {
    fn attach(&mut self, id: CompactId, address: TileAddress, geometry: &Arc<TileGeometry>);
    fn detach(&mut self, id: CompactId, address: TileAddress);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullScene;

impl Scene for NullScene {
    fn attach(&mut self, _: CompactId, _: TileAddress, _: &Arc<TileGeometry>) {}
    fn detach(&mut self, _: CompactId, _: TileAddress) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneEvent {
    Attach(CompactId, TileAddress),
    Detach(CompactId, TileAddress),
}

/// Records every event and tracks what is currently attached. Clones share
/// the same log, so a handle can be kept after the scene is moved into a tree.
#[derive(Clone, Debug, Default)]
pub struct RecordingScene {
    inner: Arc<Mutex<Recording>>,
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<SceneEvent>,
    attached: BTreeMap<CompactId, (TileAddress, Arc<TileGeometry>)>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SceneEvent> {
        self.inner
            .lock()
            .map(|r| r.events.clone())
            .unwrap_or_default()
    }

    /// Addresses of the tiles currently attached, ordered by id.
    pub fn attached(&self) -> Vec<(CompactId, TileAddress)> {
        self.inner
            .lock()
            .map(|r| r.attached.iter().map(|(id, (a, _))| (*id, *a)).collect())
            .unwrap_or_default()
    }

    /// Total triangles (surface only) across attached tiles.
    pub fn triangle_count(&self) -> usize {
        self.inner
            .lock()
            .map(|r| r.attached.values().map(|(_, g)| g.triangle_count()).sum())
            .unwrap_or_default()
    }
}

impl Scene for RecordingScene {
    fn attach(&mut self, id: CompactId, address: TileAddress, geometry: &Arc<TileGeometry>) {
        if let Ok(mut r) = self.inner.lock() {
            r.events.push(SceneEvent::Attach(id, address));
            r.attached.insert(id, (address, Arc::clone(geometry)));
        }
    }

    fn detach(&mut self, id: CompactId, address: TileAddress) {
        if let Ok(mut r) = self.inner.lock() {
            r.events.push(SceneEvent::Detach(id, address));
            r.attached.remove(&id);
        }
    }
}
