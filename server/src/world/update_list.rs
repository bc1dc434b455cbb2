// map_partition_engine/server/src/world/update_list.rs
use super::objects::WorldObject;
use crate::core::types::{ObjectGuid, PartitionId, TypeId};
use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tracing::warn;

/// Where a registered object sits, for O(1) swap-removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatableEntry {
    pub partition_id: PartitionId,
    pub index: usize,
    pub type_id: TypeId,
}

/// A registration change waiting for the partitioned-list write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingRecord {
    pub guid: ObjectGuid,
    pub type_id: TypeId,
}

impl PendingRecord {
    pub fn for_object(object: &WorldObject) -> Self {
        PendingRecord { guid: object.guid(), type_id: object.type_id() }
    }
}

/// The per-partition update lists. Only reachable through the registry's
/// lock guards, so every method here is a "no lock" operation.
#[derive(Default)]
pub struct PartitionedUpdateLists {
    lists: AHashMap<PartitionId, Vec<Arc<WorldObject>>>,
    index: AHashMap<ObjectGuid, UpdatableEntry>,
}

impl PartitionedUpdateLists {
    /// Inserts `object` into `partition_id`, moving it if it is registered
    /// elsewhere. Returns false when it was already in that partition.
    pub fn insert_no_lock(&mut self, object: &Arc<WorldObject>, partition_id: PartitionId) -> bool {
        let guid = object.guid();
        if let Some(entry) = self.index.get(&guid) {
            if entry.partition_id == partition_id {
                return false;
            }
            self.remove_no_lock(guid);
        }

        let list = self.lists.entry(partition_id).or_default();
        let index = list.len();
        list.push(Arc::clone(object));
        self.index.insert(guid, UpdatableEntry { partition_id, index, type_id: object.type_id() });
        true
    }

    pub fn remove_no_lock(&mut self, guid: ObjectGuid) -> Option<UpdatableEntry> {
        let entry = self.index.remove(&guid)?;
        let Some(list) = self.lists.get_mut(&entry.partition_id) else {
            return Some(entry);
        };

        let slot = if list.get(entry.index).map(|object| object.guid()) == Some(guid) {
            Some(entry.index)
        } else {
            list.iter().position(|object| object.guid() == guid)
        };

        if let Some(slot) = slot {
            list.swap_remove(slot);
            if let Some(moved) = list.get(slot) {
                if let Some(moved_entry) = self.index.get_mut(&moved.guid()) {
                    moved_entry.index = slot;
                }
            }
        }
        if list.is_empty() {
            self.lists.remove(&entry.partition_id);
        }
        Some(entry)
    }

    #[inline]
    pub fn entry(&self, guid: ObjectGuid) -> Option<UpdatableEntry> {
        self.index.get(&guid).copied()
    }

    #[inline]
    pub fn partition_of(&self, guid: ObjectGuid) -> Option<PartitionId> {
        self.index.get(&guid).map(|entry| entry.partition_id)
    }

    pub fn len(&self, partition_id: PartitionId) -> usize {
        self.lists.get(&partition_id).map_or(0, Vec::len)
    }

    pub fn total_len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    pub fn partitions(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.lists.keys().copied()
    }

    pub fn objects(&self, partition_id: PartitionId) -> &[Arc<WorldObject>] {
        self.lists.get(&partition_id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.total_len()
    }

    /// Rebuilds the index from the lists. A guid found in more than one list
    /// keeps its first occurrence; later copies are dropped.
    pub fn rebuild_index(&mut self) -> usize {
        self.index.clear();
        let mut seen = AHashSet::with_capacity(self.total_len());
        let mut dropped = 0;
        for (&partition_id, list) in self.lists.iter_mut() {
            list.retain(|object| {
                let keep = seen.insert(object.guid());
                if !keep {
                    dropped += 1;
                }
                keep
            });
            for (index, object) in list.iter().enumerate() {
                self.index.insert(object.guid(), UpdatableEntry { partition_id, index, type_id: object.type_id() });
            }
        }
        self.lists.retain(|_, list| !list.is_empty());
        dropped
    }

    pub fn clear(&mut self) {
        self.lists.clear();
        self.index.clear();
    }
}

/// Per-partition lists of objects that tick every frame.
///
/// Direct mutations take the write lock. Callers that must not take it (a
/// partition worker mid-update, another partition's relay drain) queue a
/// [`PendingRecord`] instead, applied after all workers finish.
#[derive(Default)]
pub struct UpdatableObjectRegistry {
    lists: RwLock<PartitionedUpdateLists>,
    pending_adds: Mutex<Vec<Arc<WorldObject>>>,
    pending_removals: Mutex<Vec<PendingRecord>>,
    pending_ownership: Mutex<Vec<PendingRecord>>,
}

impl UpdatableObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PartitionedUpdateLists> {
        self.lists.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PartitionedUpdateLists> {
        self.lists.write()
    }

    pub fn add(&self, object: &Arc<WorldObject>, partition_id: PartitionId) -> bool {
        self.lists.write().insert_no_lock(object, partition_id)
    }

    pub fn remove(&self, guid: ObjectGuid) -> Option<UpdatableEntry> {
        self.lists.write().remove_no_lock(guid)
    }

    pub fn queue_add(&self, object: Arc<WorldObject>) {
        self.pending_adds.lock().push(object);
    }

    pub fn queue_removal(&self, record: PendingRecord) {
        self.pending_removals.lock().push(record);
    }

    pub fn queue_ownership_update(&self, record: PendingRecord) {
        self.pending_ownership.lock().push(record);
    }

    pub fn take_pending_adds(&self) -> Vec<Arc<WorldObject>> {
        let mut adds = std::mem::take(&mut *self.pending_adds.lock());
        adds.sort_by_key(|object| object.guid());
        adds.dedup_by_key(|object| object.guid());
        adds
    }

    fn take_sorted(queue: &Mutex<Vec<PendingRecord>>) -> Vec<PendingRecord> {
        let mut records = std::mem::take(&mut *queue.lock());
        records.sort_unstable();
        records.dedup();
        records
    }

    pub fn take_pending_removals(&self) -> Vec<PendingRecord> {
        Self::take_sorted(&self.pending_removals)
    }

    pub fn take_pending_ownership(&self) -> Vec<PendingRecord> {
        Self::take_sorted(&self.pending_ownership)
    }

    pub fn pending_counts(&self) -> (usize, usize, usize) {
        (
            self.pending_adds.lock().len(),
            self.pending_removals.lock().len(),
            self.pending_ownership.lock().len(),
        )
    }

    /// Applies queued removals under one write lock. Returns the guids that
    /// were actually registered.
    pub fn apply_queued_removals(&self) -> Vec<ObjectGuid> {
        let records = self.take_pending_removals();
        if records.is_empty() {
            return Vec::new();
        }

        let mut lists = self.lists.write();
        let removed: Vec<ObjectGuid> = records
            .iter()
            .filter(|record| lists.remove_no_lock(record.guid).is_some())
            .map(|record| record.guid)
            .collect();

        if !lists.is_consistent() {
            let indexed = lists.indexed_len();
            let total = lists.total_len();
            let dropped = lists.rebuild_index();
            warn!(indexed, total, dropped, "Partitioned update index out of sync after removals; rebuilt");
        }
        removed
    }

    /// Snapshot of a partition's in-world objects. The handles stay valid
    /// after the lock is released but liveness must be re-checked on use.
    pub fn collect(&self, partition_id: PartitionId) -> Vec<Arc<WorldObject>> {
        self.lists
            .read()
            .objects(partition_id)
            .iter()
            .filter(|object| object.is_in_world())
            .cloned()
            .collect()
    }

    pub fn partition_of(&self, guid: ObjectGuid) -> Option<PartitionId> {
        self.lists.read().partition_of(guid)
    }

    pub fn len(&self, partition_id: PartitionId) -> usize {
        self.lists.read().len(partition_id)
    }

    pub fn total_len(&self) -> usize {
        self.lists.read().total_len()
    }
}
