// map_partition_engine/server/src/server/deferred.rs
use super::context::{PartitionContext, VisibilityDeferGuard, WorkerScope};
use super::map::PartitionedMap;
use crate::core::types::{ObjectGuid, Position};
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;

#[derive(Default)]
struct VisibilityState {
    queued: AHashSet<ObjectGuid>,
    order: VecDeque<ObjectGuid>,
}

/// Non-player objects waiting for a visibility pass, each at most once.
#[derive(Default)]
pub struct DeferredVisibilityQueue {
    state: Mutex<VisibilityState>,
}

impl DeferredVisibilityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false for empty or player guids and for guids already queued.
    pub fn push(&self, guid: ObjectGuid) -> bool {
        if guid.is_empty() || guid.is_player() {
            return false;
        }
        let mut state = self.state.lock();
        if !state.queued.insert(guid) {
            return false;
        }
        state.order.push_back(guid);
        true
    }

    /// Pops up to `budget` guids in queue order.
    pub fn take(&self, budget: usize) -> Vec<ObjectGuid> {
        let mut state = self.state.lock();
        let count = budget.min(state.order.len());
        let batch: Vec<ObjectGuid> = state.order.drain(..count).collect();
        for guid in &batch {
            state.queued.remove(guid);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct RelocationState {
    latest: AHashMap<ObjectGuid, Position>,
    order: VecDeque<ObjectGuid>,
}

/// Player relocations coalesced per guid: the last position wins, the queue
/// position of the first request is kept.
#[derive(Default)]
pub struct DeferredRelocationQueue {
    state: Mutex<RelocationState>,
}

impl DeferredRelocationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, guid: ObjectGuid, destination: Position) {
        let mut state = self.state.lock();
        if state.latest.insert(guid, destination).is_none() {
            state.order.push_back(guid);
        }
    }

    pub fn take_all(&self) -> Vec<(ObjectGuid, Position)> {
        let mut state = self.state.lock();
        let RelocationState { latest, order } = &mut *state;
        order
            .drain(..)
            .filter_map(|guid| latest.remove(&guid).map(|destination| (guid, destination)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartitionedMap {
    pub fn queue_deferred_visibility_update(&self, guid: ObjectGuid) -> bool {
        self.deferred_visibility.push(guid)
    }

    pub fn deferred_visibility_len(&self) -> usize {
        self.deferred_visibility.len()
    }

    /// Runs one visibility pass over queued objects, at most the scheduler's
    /// visibility budget per call. Objects that left the world are skipped. Returns how
    /// many were updated.
    pub fn process_deferred_visibility_updates(&self) -> usize {
        let batch = self.deferred_visibility.take(self.scheduler.visibility_budget());
        if batch.is_empty() {
            return 0;
        }

        let ctx = PartitionContext::global();
        let scope = WorkerScope::new(self, &ctx);
        let mut updated = 0;
        for guid in &batch {
            if let Some(object) = self.objects().resolve_in_world(*guid) {
                self.hooks().update_visibility(&scope, &object);
                updated += 1;
            }
        }
        trace!(map = self.map_id(), queued = batch.len(), updated, remaining = self.deferred_visibility.len(), "Processed deferred visibility");
        updated
    }

    pub fn queue_deferred_player_relocation(&self, guid: ObjectGuid, x: f32, y: f32, z: f32, o: f32) {
        self.deferred_relocations.push(guid, Position::new(x, y, z, o));
    }

    pub fn deferred_relocation_len(&self) -> usize {
        self.deferred_relocations.len()
    }

    /// Applies the latest queued position of every player once. Visibility
    /// refreshes of non-player objects requested meanwhile are queued for the
    /// next visibility pass.
    pub fn process_deferred_player_relocations(&self) -> usize {
        let relocations = self.deferred_relocations.take_all();
        if relocations.is_empty() {
            return 0;
        }

        let ctx = PartitionContext::global();
        let _defer = VisibilityDeferGuard::new(&ctx);
        let scope = WorkerScope::new(self, &ctx);
        let mut applied = 0;
        for (guid, destination) in relocations {
            let Some(player) = self.objects().resolve_in_world(guid) else {
                continue;
            };
            self.relocate_object(&ctx, &player, destination);
            self.hooks().relocate_player(&scope, &player, destination);
            applied += 1;
        }
        applied
    }
}
