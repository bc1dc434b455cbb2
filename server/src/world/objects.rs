// map_partition_engine/server/src/world/objects.rs
use crate::core::types::{compute_cell_coord, ObjectGuid, PartitionId, Position, TypeId, GLOBAL_PARTITION};
use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Live world object as seen by the partition engine. Game state lives with
/// the collaborator; this only carries what partitioning and relay routing
/// need to read.
#[derive(Debug)]
pub struct WorldObject {
    guid: ObjectGuid,
    type_id: TypeId,
    spawn_id: Option<u32>,
    in_world: AtomicBool,
    position: RwLock<Position>,
    zone_id: AtomicU32,
    current_update_partition: AtomicU32,
    has_motion_master: AtomicBool,
    ai_enabled: AtomicBool,
    minion: AtomicBool,
    needs_update: AtomicBool,
}

impl WorldObject {
    pub fn new(guid: ObjectGuid, position: Position) -> Self {
        let type_id = guid.type_id().unwrap_or(TypeId::Unit);
        let is_unit = matches!(type_id, TypeId::Player | TypeId::Unit);
        WorldObject {
            guid,
            type_id,
            spawn_id: None,
            in_world: AtomicBool::new(false),
            position: RwLock::new(position),
            zone_id: AtomicU32::new(0),
            current_update_partition: AtomicU32::new(GLOBAL_PARTITION),
            has_motion_master: AtomicBool::new(is_unit),
            ai_enabled: AtomicBool::new(type_id == TypeId::Unit),
            minion: AtomicBool::new(false),
            needs_update: AtomicBool::new(type_id != TypeId::Corpse),
        }
    }

    pub fn with_spawn_id(mut self, spawn_id: u32) -> Self {
        self.spawn_id = Some(spawn_id);
        self
    }

    pub fn with_zone(self, zone_id: u32) -> Self {
        self.zone_id.store(zone_id, Ordering::Relaxed);
        self
    }

    #[inline]
    pub fn guid(&self) -> ObjectGuid {
        self.guid
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn is_player(&self) -> bool {
        self.type_id == TypeId::Player
    }

    #[inline]
    pub fn is_unit(&self) -> bool {
        matches!(self.type_id, TypeId::Player | TypeId::Unit)
    }

    pub fn spawn_id(&self) -> Option<u32> {
        self.spawn_id
    }

    #[inline]
    pub fn is_in_world(&self) -> bool {
        self.in_world.load(Ordering::Acquire)
    }

    pub fn set_in_world(&self, in_world: bool) {
        self.in_world.store(in_world, Ordering::Release);
    }

    pub fn position(&self) -> Position {
        *self.position.read()
    }

    pub fn set_position(&self, position: Position) {
        *self.position.write() = position;
    }

    pub fn cell_id(&self) -> u32 {
        let position = self.position();
        compute_cell_coord(position.x, position.y).id()
    }

    pub fn zone_id(&self) -> u32 {
        self.zone_id.load(Ordering::Relaxed)
    }

    pub fn set_zone_id(&self, zone_id: u32) {
        self.zone_id.store(zone_id, Ordering::Relaxed);
    }

    /// Partition whose worker is ticking this object right now, 0 if none.
    #[inline]
    pub fn current_update_partition(&self) -> PartitionId {
        self.current_update_partition.load(Ordering::Acquire)
    }

    pub fn set_current_update_partition(&self, partition_id: PartitionId) {
        self.current_update_partition.store(partition_id, Ordering::Release);
    }

    pub fn has_motion_master(&self) -> bool {
        self.has_motion_master.load(Ordering::Relaxed)
    }

    pub fn set_has_motion_master(&self, value: bool) {
        self.has_motion_master.store(value, Ordering::Relaxed);
    }

    pub fn is_ai_enabled(&self) -> bool {
        self.ai_enabled.load(Ordering::Relaxed)
    }

    pub fn set_ai_enabled(&self, value: bool) {
        self.ai_enabled.store(value, Ordering::Relaxed);
    }

    pub fn is_minion(&self) -> bool {
        self.minion.load(Ordering::Relaxed)
    }

    pub fn set_minion(&self, value: bool) {
        self.minion.store(value, Ordering::Relaxed);
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update.load(Ordering::Relaxed)
    }

    pub fn set_needs_update(&self, value: bool) {
        self.needs_update.store(value, Ordering::Relaxed);
    }
}

/// Guid → handle lookup for every object on the map, plus the spawn-id index.
/// Each of the two maps has its own lock.
#[derive(Default)]
pub struct ObjectStore {
    objects: RwLock<AHashMap<ObjectGuid, Arc<WorldObject>>>,
    spawn_ids: RwLock<AHashMap<u32, SmallVec<[ObjectGuid; 2]>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: Arc<WorldObject>) -> Option<Arc<WorldObject>> {
        let guid = object.guid();
        if let Some(spawn_id) = object.spawn_id() {
            let mut spawn_ids = self.spawn_ids.write();
            let guids = spawn_ids.entry(spawn_id).or_default();
            if !guids.contains(&guid) {
                guids.push(guid);
            }
        }
        self.objects.write().insert(guid, object)
    }

    pub fn remove(&self, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        let removed = self.objects.write().remove(&guid)?;
        if let Some(spawn_id) = removed.spawn_id() {
            let mut spawn_ids = self.spawn_ids.write();
            if let Some(guids) = spawn_ids.get_mut(&spawn_id) {
                guids.retain(|g| *g != guid);
                if guids.is_empty() {
                    spawn_ids.remove(&spawn_id);
                }
            }
        }
        Some(removed)
    }

    /// Resolution fails once the object has been removed.
    #[inline]
    pub fn resolve(&self, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        if guid.is_empty() {
            return None;
        }
        self.objects.read().get(&guid).cloned()
    }

    pub fn resolve_in_world(&self, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        self.resolve(guid).filter(|object| object.is_in_world())
    }

    pub fn guids_for_spawn_id(&self, spawn_id: u32) -> SmallVec<[ObjectGuid; 2]> {
        self.spawn_ids.read().get(&spawn_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<WorldObject>> {
        self.objects.read().values().cloned().collect()
    }

    pub fn players_in_world(&self) -> Vec<Arc<WorldObject>> {
        self.objects
            .read()
            .values()
            .filter(|object| object.is_player() && object.is_in_world())
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct PartitionedStoreInner {
    stores: AHashMap<PartitionId, AHashMap<ObjectGuid, Arc<WorldObject>>>,
    index: AHashMap<ObjectGuid, PartitionId>,
}

/// Per-partition object maps, kept beside the update lists so a worker can
/// look up objects it owns without touching the map-wide store.
#[derive(Default)]
pub struct PartitionedObjectStore {
    inner: RwLock<PartitionedStoreInner>,
}

impl PartitionedObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or moves `object` into `partition_id`'s store.
    pub fn register(&self, object: &Arc<WorldObject>, partition_id: PartitionId) {
        let guid = object.guid();
        let mut inner = self.inner.write();
        if let Some(previous) = inner.index.insert(guid, partition_id) {
            if previous != partition_id {
                if let Some(store) = inner.stores.get_mut(&previous) {
                    store.remove(&guid);
                }
            }
        }
        inner.stores.entry(partition_id).or_default().insert(guid, Arc::clone(object));
    }

    pub fn unregister(&self, guid: ObjectGuid) -> Option<PartitionId> {
        let mut inner = self.inner.write();
        let partition_id = inner.index.remove(&guid)?;
        if let Some(store) = inner.stores.get_mut(&partition_id) {
            store.remove(&guid);
            if store.is_empty() {
                inner.stores.remove(&partition_id);
            }
        }
        Some(partition_id)
    }

    pub fn find(&self, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        let inner = self.inner.read();
        let partition_id = inner.index.get(&guid)?;
        inner.stores.get(partition_id)?.get(&guid).cloned()
    }

    pub fn partition_of(&self, guid: ObjectGuid) -> Option<PartitionId> {
        self.inner.read().index.get(&guid).copied()
    }

    pub fn partition_len(&self, partition_id: PartitionId) -> usize {
        self.inner.read().stores.get(&partition_id).map_or(0, |store| store.len())
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.stores.clear();
        inner.index.clear();
    }
}
