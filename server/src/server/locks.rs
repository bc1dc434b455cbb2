// map_partition_engine/server/src/server/locks.rs
use crate::core::constants::MAP_INVALID_ZONE;
use crate::core::types::ObjectGuid;
use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};

/// Map state outside the partition lists, one lock per structure. None of
/// these locks is ever taken while another of them is held.
#[derive(Default)]
pub struct MapLocks {
    grid_objects: RwLock<AHashMap<u32, AHashSet<ObjectGuid>>>,
    dynamic_tree: RwLock<AHashSet<ObjectGuid>>,
    respawn_times: Mutex<AHashMap<u32, u64>>,
    zone_player_counts: Mutex<AHashMap<u32, u32>>,
    update_objects: Mutex<AHashSet<ObjectGuid>>,
    delayed_visibility: Mutex<Vec<ObjectGuid>>,
}

impl MapLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_grid(&self, guid: ObjectGuid, cell_id: u32) {
        self.grid_objects.write().entry(cell_id).or_default().insert(guid);
    }

    pub fn remove_from_grid(&self, guid: ObjectGuid, cell_id: u32) {
        let mut grid = self.grid_objects.write();
        if let Some(cell) = grid.get_mut(&cell_id) {
            cell.remove(&guid);
            if cell.is_empty() {
                grid.remove(&cell_id);
            }
        }
    }

    pub fn move_in_grid(&self, guid: ObjectGuid, from_cell: u32, to_cell: u32) {
        if from_cell == to_cell {
            return;
        }
        let mut grid = self.grid_objects.write();
        if let Some(cell) = grid.get_mut(&from_cell) {
            cell.remove(&guid);
            if cell.is_empty() {
                grid.remove(&from_cell);
            }
        }
        grid.entry(to_cell).or_default().insert(guid);
    }

    pub fn objects_in_cell(&self, cell_id: u32) -> Vec<ObjectGuid> {
        self.grid_objects
            .read()
            .get(&cell_id)
            .map(|cell| cell.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn insert_collider(&self, guid: ObjectGuid) {
        self.dynamic_tree.write().insert(guid);
    }

    pub fn remove_collider(&self, guid: ObjectGuid) {
        self.dynamic_tree.write().remove(&guid);
    }

    pub fn has_collider(&self, guid: ObjectGuid) -> bool {
        self.dynamic_tree.read().contains(&guid)
    }

    pub fn set_respawn_time(&self, spawn_id: u32, respawn_at_ms: u64) {
        self.respawn_times.lock().insert(spawn_id, respawn_at_ms);
    }

    pub fn respawn_time(&self, spawn_id: u32) -> Option<u64> {
        self.respawn_times.lock().get(&spawn_id).copied()
    }

    pub fn remove_respawn_time(&self, spawn_id: u32) -> Option<u64> {
        self.respawn_times.lock().remove(&spawn_id)
    }

    /// Moves one player between zone counters. `MAP_INVALID_ZONE` on either
    /// side means "none".
    pub fn update_zone_player_count(&self, old_zone: u32, new_zone: u32) {
        if old_zone == new_zone {
            return;
        }
        let mut counts = self.zone_player_counts.lock();
        if old_zone != MAP_INVALID_ZONE {
            if let Some(count) = counts.get_mut(&old_zone) {
                *count = count.saturating_sub(1);
            }
        }
        if new_zone != MAP_INVALID_ZONE {
            *counts.entry(new_zone).or_insert(0) += 1;
        }
    }

    pub fn zone_player_count(&self, zone_id: u32) -> u32 {
        self.zone_player_counts.lock().get(&zone_id).copied().unwrap_or(0)
    }

    pub fn add_update_object(&self, guid: ObjectGuid) {
        self.update_objects.lock().insert(guid);
    }

    pub fn remove_update_object(&self, guid: ObjectGuid) {
        self.update_objects.lock().remove(&guid);
    }

    pub fn take_update_objects(&self) -> Vec<ObjectGuid> {
        std::mem::take(&mut *self.update_objects.lock()).into_iter().collect()
    }

    pub fn add_delayed_visibility(&self, guid: ObjectGuid) {
        self.delayed_visibility.lock().push(guid);
    }

    pub fn take_delayed_visibility(&self) -> Vec<ObjectGuid> {
        std::mem::take(&mut *self.delayed_visibility.lock())
    }
}
