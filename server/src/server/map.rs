// map_partition_engine/server/src/server/map.rs
use super::context::{PartitionContext, WorkerScope};
use super::deferred::{DeferredRelocationQueue, DeferredVisibilityQueue};
use super::hooks::WorldHooks;
use super::locks::MapLocks;
use super::relay_queue::RelayQueueSet;
use super::scheduler::PartitionScheduler;
use crate::concurrent::cell_marks::CellMarkSet;
use crate::concurrent::thread_pools::PartitionWorkerPool;
use crate::core::config::PartitionConfig;
use crate::core::constants::MAP_INVALID_ZONE;
use crate::core::error::PartitionResult;
use crate::core::types::{MapId, ObjectGuid, PartitionId, Position, TypeId, GLOBAL_PARTITION};
use crate::world::objects::{ObjectStore, PartitionedObjectStore, WorldObject};
use crate::world::partition::PartitionAssignment;
use crate::world::update_list::{PartitionedUpdateLists, PendingRecord, UpdatableObjectRegistry};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// One world map split into partitions that update in parallel.
///
/// Objects live in the map-wide [`ObjectStore`]. Non-player objects are also
/// registered on exactly one partition's update list; players are grouped
/// into per-partition buckets at the start of every cycle. Effects that
/// cross partitions travel through the relay queues.
pub struct PartitionedMap {
    map_id: MapId,
    config: PartitionConfig,
    partitioned: AtomicBool,
    hooks: Arc<dyn WorldHooks>,
    objects: ObjectStore,
    partitioned_objects: PartitionedObjectStore,
    assignment: PartitionAssignment,
    registry: UpdatableObjectRegistry,
    pub(crate) relays: RelayQueueSet,
    cell_marks: CellMarkSet,
    pub(crate) scheduler: PartitionScheduler,
    pub(crate) deferred_visibility: DeferredVisibilityQueue,
    pub(crate) deferred_relocations: DeferredRelocationQueue,
    locks: MapLocks,
    pub(crate) player_buckets: ArcSwap<Vec<Vec<Arc<WorldObject>>>>,
    pool: Option<Arc<PartitionWorkerPool>>,
    tick_counter: AtomicU64,
}

impl PartitionedMap {
    pub fn new(
        map_id: MapId,
        config: PartitionConfig,
        hooks: Arc<dyn WorldHooks>,
        pool: Option<Arc<PartitionWorkerPool>>,
    ) -> PartitionResult<Self> {
        config.validate()?;
        let partition_count = config.partition_count;
        let worker_threads = pool.as_ref().map_or(1, |pool| pool.threads());

        info!(
            map = map_id,
            partitions = partition_count,
            enabled = config.enabled,
            parallel = config.parallel && pool.is_some(),
            worker_threads,
            "Creating partitioned map"
        );

        Ok(PartitionedMap {
            map_id,
            partitioned: AtomicBool::new(config.enabled),
            hooks,
            objects: ObjectStore::new(),
            partitioned_objects: PartitionedObjectStore::new(),
            assignment: PartitionAssignment::new(partition_count, config.border_overlap),
            registry: UpdatableObjectRegistry::new(),
            relays: RelayQueueSet::new(partition_count, config.relay_queue_limit, config.relay_overflow_policy),
            cell_marks: CellMarkSet::for_map(),
            scheduler: PartitionScheduler::new(&config, worker_threads),
            deferred_visibility: DeferredVisibilityQueue::new(),
            deferred_relocations: DeferredRelocationQueue::new(),
            locks: MapLocks::new(),
            player_buckets: ArcSwap::from_pointee(Vec::new()),
            pool,
            tick_counter: AtomicU64::new(0),
            config,
        })
    }

    #[inline]
    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    #[inline]
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    #[inline]
    pub fn hooks(&self) -> &dyn WorldHooks {
        self.hooks.as_ref()
    }

    #[inline]
    pub fn is_partitioned(&self) -> bool {
        self.partitioned.load(Ordering::Acquire)
    }

    #[inline]
    pub fn partition_count(&self) -> u32 {
        self.assignment.partition_count()
    }

    pub fn assignment(&self) -> &PartitionAssignment {
        &self.assignment
    }

    pub fn registry(&self) -> &UpdatableObjectRegistry {
        &self.registry
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn locks(&self) -> &MapLocks {
        &self.locks
    }

    pub fn scheduler(&self) -> &PartitionScheduler {
        &self.scheduler
    }

    pub(crate) fn pool(&self) -> Option<&Arc<PartitionWorkerPool>> {
        self.pool.as_ref()
    }

    /// Ticks completed by [`PartitionedMap::update`].
    pub fn tick_count(&self) -> u64 {
        self.tick_counter.load(Ordering::Relaxed)
    }

    pub(crate) fn advance_tick(&self) -> u64 {
        self.tick_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Switches partitioning on or off and recomputes every assignment.
    /// Any cycle in progress is abandoned.
    pub fn set_partitioned(&self, enabled: bool) {
        if self.partitioned.swap(enabled, Ordering::AcqRel) == enabled {
            return;
        }
        info!(map = self.map_id, enabled, "Partitioning toggled");
        self.scheduler.abandon_cycle();
        self.rebuild_partitioned_object_assignments();
    }

    // --- assignment queries ---

    /// Partition that should own `unit` now. 0 when partitioning is off.
    pub fn partition_id_for_unit(&self, unit: &WorldObject) -> PartitionId {
        if !self.is_partitioned() {
            return GLOBAL_PARTITION;
        }
        self.assignment.partition_for(unit.guid(), unit.position())
    }

    /// Partition a relay for `unit` should be queued on, or `None` when the
    /// caller should apply the effect directly.
    pub fn try_get_relay_target_partition(&self, ctx: &PartitionContext, unit: &WorldObject) -> Option<PartitionId> {
        if !self.is_partitioned() || !unit.is_in_world() {
            return None;
        }
        let active = ctx.active_partition()?;
        if ctx.is_processing_relays() || unit.current_update_partition() == active {
            return None;
        }
        let owner = self.partition_id_for_unit(unit);
        (owner != GLOBAL_PARTITION && owner != active).then_some(owner)
    }

    // --- object lifecycle ---

    /// Puts `object` into the world. From inside a partition worker the
    /// update-list registration is queued until the next cycle starts.
    pub fn add_to_map(&self, ctx: &PartitionContext, object: Arc<WorldObject>) {
        let guid = object.guid();
        object.set_in_world(true);
        self.objects.insert(Arc::clone(&object));
        self.locks.add_to_grid(guid, object.cell_id());
        if object.type_id() == TypeId::GameObject {
            self.locks.insert_collider(guid);
        }
        if object.is_player() {
            self.locks.update_zone_player_count(MAP_INVALID_ZONE, object.zone_id());
            return;
        }

        if ctx.active_partition().is_some() {
            self.registry.queue_add(object);
        } else {
            self.add_to_partitioned_update_list(&object);
        }
    }

    /// Takes the object out of the world. Returns the handle so the caller
    /// can finish tearing it down.
    pub fn remove_from_map(&self, ctx: &PartitionContext, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        let object = self.objects.remove(guid)?;
        object.set_in_world(false);
        self.locks.remove_from_grid(guid, object.cell_id());
        self.locks.remove_collider(guid);
        self.locks.remove_update_object(guid);
        self.assignment.clear_partition_override(guid);

        if object.is_player() {
            self.locks.update_zone_player_count(object.zone_id(), MAP_INVALID_ZONE);
            self.assignment.clear_ownership(guid);
        } else {
            self.remove_from_partitioned_update_list(ctx, &object);
        }
        Some(object)
    }

    /// Moves `object` and keeps grid and partition membership in step.
    pub fn relocate_object(&self, ctx: &PartitionContext, object: &Arc<WorldObject>, destination: Position) {
        let from_cell = object.cell_id();
        object.set_position(destination);
        self.locks.move_in_grid(object.guid(), from_cell, object.cell_id());
        if !object.is_player() {
            self.update_partitioned_ownership(ctx, object);
        }
    }

    // --- partitioned update lists ---

    /// Registers `object` on its owning partition, moving it if it already
    /// sits elsewhere. Returns false when nothing changed.
    pub fn add_to_partitioned_update_list(&self, object: &Arc<WorldObject>) -> bool {
        let partition_id = self.partition_id_for_unit(object);
        let changed = self.registry.add(object, partition_id);
        self.partitioned_objects.register(object, partition_id);
        changed
    }

    /// Removes `object` from the update lists. Inside a partition worker the
    /// removal is queued instead.
    pub fn remove_from_partitioned_update_list(&self, ctx: &PartitionContext, object: &WorldObject) {
        if ctx.active_partition().is_some() {
            self.queue_partitioned_update_list_removal(object);
            return;
        }
        if self.registry.remove(object.guid()).is_some() {
            self.partitioned_objects.unregister(object.guid());
        }
    }

    /// Removal for callers already holding the registry's write guard.
    pub fn remove_from_partitioned_update_list_no_lock(&self, lists: &mut PartitionedUpdateLists, guid: ObjectGuid) -> bool {
        let removed = lists.remove_no_lock(guid).is_some();
        if removed {
            self.partitioned_objects.unregister(guid);
        }
        removed
    }

    pub fn queue_partitioned_update_list_removal(&self, object: &WorldObject) {
        self.registry.queue_removal(PendingRecord::for_object(object));
    }

    pub fn apply_queued_partitioned_removals(&self) -> usize {
        let removed = self.registry.apply_queued_removals();
        for guid in &removed {
            self.partitioned_objects.unregister(*guid);
        }
        if !removed.is_empty() {
            debug!(map = self.map_id, removed = removed.len(), "Applied queued partition removals");
        }
        removed.len()
    }

    /// Recomputes the owner of a registered object. From inside a partition
    /// worker the move is queued; otherwise it happens now. Returns true when
    /// the owner changed.
    pub fn update_partitioned_ownership(&self, ctx: &PartitionContext, object: &Arc<WorldObject>) -> bool {
        if !self.is_partitioned() || object.is_player() {
            return false;
        }
        let target = self.partition_id_for_unit(object);
        match self.registry.partition_of(object.guid()) {
            Some(current) if current != target => {}
            _ => return false,
        }

        if ctx.active_partition().is_some() {
            self.registry.queue_ownership_update(PendingRecord::for_object(object));
        } else {
            self.registry.add(object, target);
            self.partitioned_objects.register(object, target);
        }
        true
    }

    /// Moves every queued ownership change under a single write lock.
    /// Objects that left the world or were unregistered meanwhile are skipped.
    pub fn apply_queued_partitioned_ownership_updates(&self) -> usize {
        let records = self.registry.take_pending_ownership();
        if records.is_empty() {
            return 0;
        }

        let resolved: Vec<(Arc<WorldObject>, PartitionId)> = records
            .iter()
            .filter_map(|record| self.objects.resolve_in_world(record.guid))
            .map(|object| {
                let partition_id = self.partition_id_for_unit(&object);
                (object, partition_id)
            })
            .collect();

        let mut moved = Vec::with_capacity(resolved.len());
        {
            let mut lists = self.registry.write();
            for (object, partition_id) in &resolved {
                if lists.partition_of(object.guid()).is_some() && lists.insert_no_lock(object, *partition_id) {
                    moved.push((Arc::clone(object), *partition_id));
                }
            }
        }
        for (object, partition_id) in &moved {
            self.partitioned_objects.register(object, *partition_id);
        }

        trace!(map = self.map_id, queued = records.len(), moved = moved.len(), "Applied queued ownership updates");
        moved.len()
    }

    /// Registers objects added from inside partition workers.
    pub fn flush_pending_adds(&self) -> usize {
        let adds = self.registry.take_pending_adds();
        if adds.is_empty() {
            return 0;
        }

        let placed: Vec<(Arc<WorldObject>, PartitionId)> = adds
            .into_iter()
            .filter(|object| object.is_in_world())
            .map(|object| {
                let partition_id = self.partition_id_for_unit(&object);
                (object, partition_id)
            })
            .collect();
        {
            let mut lists = self.registry.write();
            for (object, partition_id) in &placed {
                lists.insert_no_lock(object, *partition_id);
            }
        }
        for (object, partition_id) in &placed {
            self.partitioned_objects.register(object, *partition_id);
        }
        placed.len()
    }

    pub fn collect_partitioned_updatable_objects(&self, partition_id: PartitionId) -> Vec<Arc<WorldObject>> {
        self.registry.collect(partition_id)
    }

    /// Recomputes every registration from scratch under the write lock.
    pub fn rebuild_partitioned_object_assignments(&self) {
        let objects: Vec<Arc<WorldObject>> = self
            .objects
            .snapshot()
            .into_iter()
            .filter(|object| object.is_in_world() && !object.is_player())
            .collect();

        let mut lists = self.registry.write();
        lists.clear();
        self.partitioned_objects.clear();
        for object in &objects {
            let partition_id = self.partition_id_for_unit(object);
            lists.insert_no_lock(object, partition_id);
            self.partitioned_objects.register(object, partition_id);
        }
        let partitions = lists.partitions().count();
        drop(lists);

        info!(
            map = self.map_id,
            objects = objects.len(),
            partitions,
            partitioned = self.is_partitioned(),
            "Rebuilt partitioned object assignments"
        );
    }

    pub fn find_partitioned_object(&self, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        self.partitioned_objects.find(guid)
    }

    pub fn partitioned_object_count(&self, partition_id: PartitionId) -> usize {
        self.partitioned_objects.partition_len(partition_id)
    }

    // --- cells ---

    #[inline]
    pub fn mark_cell(&self, cell_id: u32) {
        self.cell_marks.mark(cell_id);
    }

    #[inline]
    pub fn is_cell_marked(&self, cell_id: u32) -> bool {
        self.cell_marks.is_marked(cell_id)
    }

    pub fn reset_marked_cells(&self) {
        self.cell_marks.reset();
    }

    pub fn marked_cell_count(&self) -> usize {
        self.cell_marks.marked_count()
    }

    // --- visibility ---

    /// Recomputes visibility for `object` now, or queues it when the
    /// context is inside a [`super::context::VisibilityDeferGuard`].
    pub fn request_visibility_update(&self, ctx: &PartitionContext, object: &Arc<WorldObject>) {
        if ctx.should_defer_non_player_visibility(object) {
            self.queue_deferred_visibility_update(object.guid());
            return;
        }
        self.hooks.update_visibility(&WorkerScope::new(self, ctx), object);
    }
}
