//! Bounded namespace of compact tile identifiers.
//!
//! Feedback images carry tile ids in two 8-bit channels, so only
//! `255 × 256` distinct ids can ever be live at once. Id `0` is the background
//! value of the id image and is never handed out.

use std::collections::BTreeSet;

use crate::{NodeKey, TreeError};

/// A small reusable integer naming one live tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactId(u16);

impl CompactId {
    /// Background sentinel; never assigned to a tile.
    pub const BACKGROUND: CompactId = CompactId(0);

    /// Exclusive upper bound on id values.
    pub const LIMIT: u32 = 255 * 256;

    /// Wrap a raw id decoded from feedback. Returns `None` for the background
    /// value and anything at or above [`Self::LIMIT`].
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw == 0 || raw >= Self::LIMIT {
            return None;
        }
        Some(Self(raw as u16))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl From<CompactId> for u32 {
    fn from(id: CompactId) -> Self {
        u32::from(id.0)
    }
}

impl std::fmt::Display for CompactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Reserved,
    Live(NodeKey),
}

/// Allocates compact ids, preferring the lowest released id.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Option<Slot>>,
    free: BTreeSet<u16>,
    capacity: u32,
    live: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry spanning the full id space.
    pub fn new() -> Self {
        Self::with_capacity(CompactId::LIMIT - 1)
    }

    /// A registry that hands out at most `capacity` ids.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds the id space.
    pub fn with_capacity(capacity: u32) -> Self {
        assert!(
            capacity < CompactId::LIMIT,
            "capacity {capacity} exceeds the compact id space"
        );
        Self {
            // Slot 0 is the background sentinel.
            slots: vec![None],
            free: BTreeSet::new(),
            capacity,
            live: 0,
        }
    }

    /// Ids currently reserved or bound.
    pub fn in_use(&self) -> usize {
        self.live
    }

    /// Ids that could still be handed out.
    pub fn available(&self) -> usize {
        self.capacity as usize - self.live
    }

    fn take(&mut self) -> Option<CompactId> {
        let raw = match self.free.pop_first() {
            Some(raw) => raw,
            None => {
                let next = self.slots.len();
                if next > self.capacity as usize {
                    return None;
                }
                self.slots.push(None);
                next as u16
            }
        };
        self.slots[usize::from(raw)] = Some(Slot::Reserved);
        self.live += 1;
        Some(CompactId(raw))
    }

    /// Reserve `count` ids at once, or none at all.
    pub fn reserve(&mut self, count: usize) -> Result<Vec<CompactId>, TreeError> {
        if self.available() < count {
            return Err(TreeError::IdsExhausted { live: self.live });
        }
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            match self.take() {
                Some(id) => ids.push(id),
                None => {
                    for id in ids {
                        self.release(id);
                    }
                    return Err(TreeError::IdsExhausted { live: self.live });
                }
            }
        }
        Ok(ids)
    }

    /// Attach a reserved id to the node that now owns it.
    pub fn bind(&mut self, id: CompactId, key: NodeKey) {
        let slot = &mut self.slots[usize::from(id.0)];
        debug_assert_eq!(*slot, Some(Slot::Reserved), "binding unreserved id {id}");
        *slot = Some(Slot::Live(key));
    }

    /// Return an id to the free list.
    pub fn release(&mut self, id: CompactId) {
        let Some(slot) = self.slots.get_mut(usize::from(id.0)) else {
            return;
        };
        if slot.take().is_some() {
            self.free.insert(id.0);
            self.live -= 1;
        }
    }

    /// Node currently bound to `id`.
    pub fn lookup(&self, id: CompactId) -> Option<NodeKey> {
        match self.slots.get(usize::from(id.0)) {
            Some(Some(Slot::Live(key))) => Some(*key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut registry = Registry::new();
        let ids = registry.reserve(3).unwrap();
        assert_eq!(ids.iter().map(|id| id.get()).collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn test_released_ids_are_reused_lowest_first() {
        let mut registry = Registry::new();
        let ids = registry.reserve(5).unwrap();
        registry.release(ids[3]);
        registry.release(ids[1]);
        let again = registry.reserve(2).unwrap();
        assert_eq!(again, vec![ids[1], ids[3]]);
        assert_eq!(registry.in_use(), 5);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut registry = Registry::with_capacity(6);
        registry.reserve(3).unwrap();
        assert_eq!(
            registry.reserve(4),
            Err(TreeError::IdsExhausted { live: 3 })
        );
        assert_eq!(registry.in_use(), 3);
        assert_eq!(registry.reserve(3).unwrap().len(), 3);
        assert_eq!(registry.available(), 0);
    }

    #[test]
    fn test_bind_and_lookup() {
        let mut registry = Registry::new();
        let id = registry.reserve(1).unwrap()[0];
        assert_eq!(registry.lookup(id), None, "reserved ids are not yet live");
        registry.bind(id, NodeKey(7));
        assert_eq!(registry.lookup(id), Some(NodeKey(7)));
        registry.release(id);
        assert_eq!(registry.lookup(id), None);
        // Double release is harmless.
        registry.release(id);
        assert_eq!(registry.in_use(), 0);
    }

    #[test]
    fn test_from_raw_rejects_background_and_overflow() {
        assert_eq!(CompactId::from_raw(0), None);
        assert_eq!(CompactId::from_raw(CompactId::LIMIT), None);
        assert_eq!(CompactId::from_raw(12).map(CompactId::get), Some(12));
    }

    #[test]
    fn test_full_space_is_bounded() {
        let mut registry = Registry::new();
        let all = registry.reserve(registry.available()).unwrap();
        assert_eq!(all.len(), (CompactId::LIMIT - 1) as usize);
        assert_eq!(all.last().map(|id| u32::from(*id)), Some(CompactId::LIMIT - 1));
        assert!(registry.reserve(1).is_err());
    }
}
