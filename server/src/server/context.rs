// map_partition_engine/server/src/server/context.rs
use super::map::PartitionedMap;
use crate::core::types::{PartitionId, GLOBAL_PARTITION};
use crate::world::objects::WorldObject;
use std::cell::Cell;

/// The logical worker a piece of code is running for.
///
/// Created by whoever drives a partition (a worker task, a relay drain, the
/// map's own tick) and passed down explicitly. Not `Sync`: a context belongs
/// to exactly one running task.
#[derive(Debug)]
pub struct PartitionContext {
    partition_id: PartitionId,
    processing_relays: Cell<bool>,
    visibility_defer_depth: Cell<u32>,
}

impl PartitionContext {
    pub fn new(partition_id: PartitionId) -> Self {
        PartitionContext {
            partition_id,
            processing_relays: Cell::new(false),
            visibility_defer_depth: Cell::new(0),
        }
    }

    /// Context for work running outside any partition worker.
    pub fn global() -> Self {
        Self::new(GLOBAL_PARTITION)
    }

    #[inline]
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// The partition being worked on, or `None` for global work.
    #[inline]
    pub fn active_partition(&self) -> Option<PartitionId> {
        (self.partition_id != GLOBAL_PARTITION).then_some(self.partition_id)
    }

    #[inline]
    pub fn is_processing_relays(&self) -> bool {
        self.processing_relays.get()
    }

    pub fn begin_relay_processing(&self) -> ProcessingRelaysGuard<'_> {
        let previous = self.processing_relays.replace(true);
        ProcessingRelaysGuard { context: self, previous }
    }

    #[inline]
    pub fn visibility_defer_depth(&self) -> u32 {
        self.visibility_defer_depth.get()
    }

    pub fn should_defer_non_player_visibility(&self, object: &WorldObject) -> bool {
        !object.is_player() && self.visibility_defer_depth.get() > 0
    }
}

pub struct ProcessingRelaysGuard<'a> {
    context: &'a PartitionContext,
    previous: bool,
}

impl Drop for ProcessingRelaysGuard<'_> {
    fn drop(&mut self) {
        self.context.processing_relays.set(self.previous);
    }
}

/// Scope in which visibility updates for non-player objects are queued
/// instead of applied. Nests; the outermost drop re-enables direct updates.
pub struct VisibilityDeferGuard<'a> {
    context: &'a PartitionContext,
}

impl<'a> VisibilityDeferGuard<'a> {
    pub fn new(context: &'a PartitionContext) -> Self {
        context.visibility_defer_depth.set(context.visibility_defer_depth.get() + 1);
        VisibilityDeferGuard { context }
    }
}

impl Drop for VisibilityDeferGuard<'_> {
    fn drop(&mut self) {
        let depth = self.context.visibility_defer_depth.get();
        self.context.visibility_defer_depth.set(depth.saturating_sub(1));
    }
}

/// What every collaborator callback receives: the map and the context of the
/// worker that is calling.
#[derive(Clone, Copy)]
pub struct WorkerScope<'a> {
    pub map: &'a PartitionedMap,
    pub ctx: &'a PartitionContext,
}

impl<'a> WorkerScope<'a> {
    pub fn new(map: &'a PartitionedMap, ctx: &'a PartitionContext) -> Self {
        WorkerScope { map, ctx }
    }

    #[inline]
    pub fn partition_id(&self) -> PartitionId {
        self.ctx.partition_id()
    }
}
