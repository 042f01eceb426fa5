use std::collections::{BTreeSet, HashMap};

use indexmap::{IndexMap, IndexSet};

use crate::common::normalize_key;
use crate::document::JsonDocument;
use crate::session::entity::{AnyEntity, EntityHandle};
use crate::session::tracked_entry::TrackedEntry;

/// A tracked object together with its bookkeeping.
pub(crate) struct TrackedObject {
    pub(crate) entity: Box<dyn AnyEntity>,
    pub(crate) entry: TrackedEntry,
}

struct Slot {
    generation: u64,
    occupant: Option<TrackedObject>,
}

/// Arena-backed identity map.
///
/// Objects are addressed by [EntityHandle]s handed out when they are first
/// tracked. A slot's generation is bumped whenever it is vacated, so stale
/// handles never alias a newer object. Keys are matched case-insensitively.
#[derive(Default)]
pub(crate) struct IdentityMap {
    slots: Vec<Slot>,
    free: Vec<usize>,
    order: IndexSet<EntityHandle>,
    by_key: HashMap<String, EntityHandle>,
    pending_deletions: IndexSet<EntityHandle>,
    known_missing: BTreeSet<String>,
    included: IndexMap<String, JsonDocument>,
}

impl IdentityMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, entity: Box<dyn AnyEntity>, entry: TrackedEntry) -> EntityHandle {
        let occupant = Some(TrackedObject { entity, entry });
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.occupant = occupant;
                EntityHandle::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    occupant,
                });
                EntityHandle::new(self.slots.len() - 1, 0)
            }
        };
        self.order.insert(handle);
        handle
    }

    pub(crate) fn contains(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    pub(crate) fn get(&self, handle: EntityHandle) -> Option<&TrackedObject> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.occupant.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut TrackedObject> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.occupant.as_mut())
    }

    /// Stops tracking the object: drops its entry, its key mapping and any
    /// pending deletion.
    pub(crate) fn remove(&mut self, handle: EntityHandle) -> Option<TrackedObject> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        let removed = slot.occupant.take()?;
        slot.generation += 1;
        self.free.push(handle.index());
        self.order.shift_remove(&handle);
        self.pending_deletions.shift_remove(&handle);
        if let Some(key) = removed.entry.key() {
            self.unmap_key_if(key, handle);
        }
        Some(removed)
    }

    /// Handles of all tracked objects in tracking order.
    pub(crate) fn handles(&self) -> Vec<EntityHandle> {
        self.order.iter().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn handle_for_key(&self, key: &str) -> Option<EntityHandle> {
        self.by_key.get(&normalize_key(key)).copied()
    }

    pub(crate) fn map_key(&mut self, key: &str, handle: EntityHandle) {
        self.by_key.insert(normalize_key(key), handle);
    }

    pub(crate) fn unmap_key(&mut self, key: &str) -> Option<EntityHandle> {
        self.by_key.remove(&normalize_key(key))
    }

    fn unmap_key_if(&mut self, key: &str, handle: EntityHandle) {
        let normalized = normalize_key(key);
        if self.by_key.get(&normalized) == Some(&handle) {
            self.by_key.remove(&normalized);
        }
    }

    // pending deletions

    pub(crate) fn mark_deleted(&mut self, handle: EntityHandle) {
        self.pending_deletions.insert(handle);
    }

    pub(crate) fn is_pending_deletion(&self, handle: EntityHandle) -> bool {
        self.pending_deletions.contains(&handle)
    }

    pub(crate) fn pending_deletions(&self) -> Vec<EntityHandle> {
        self.pending_deletions.iter().copied().collect()
    }

    pub(crate) fn has_pending_deletions(&self) -> bool {
        !self.pending_deletions.is_empty()
    }

    pub(crate) fn clear_pending_deletions(&mut self) {
        self.pending_deletions.clear();
    }

    // known missing keys

    pub(crate) fn register_missing(&mut self, key: &str) {
        self.known_missing.insert(normalize_key(key));
    }

    pub(crate) fn unregister_missing(&mut self, key: &str) {
        self.known_missing.remove(&normalize_key(key));
    }

    pub(crate) fn is_known_missing(&self, key: &str) -> bool {
        self.known_missing.contains(&normalize_key(key))
    }

    // included documents

    pub(crate) fn include(&mut self, document: JsonDocument) {
        self.included.insert(normalize_key(document.key()), document);
    }

    pub(crate) fn remove_included(&mut self, key: &str) -> Option<JsonDocument> {
        self.included.shift_remove(&normalize_key(key))
    }

    pub(crate) fn is_included(&self, key: &str) -> bool {
        self.included.contains_key(&normalize_key(key))
    }

    pub(crate) fn included_document(&self, key: &str) -> Option<&JsonDocument> {
        self.included.get(&normalize_key(key))
    }

    /// Drops every entry, pending deletion and known-missing key.
    pub(crate) fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.occupant.take().is_some() {
                slot.generation += 1;
            }
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.order.clear();
        self.by_key.clear();
        self.pending_deletions.clear();
        self.known_missing.clear();
    }
}
