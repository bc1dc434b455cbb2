// map_partition_engine/server/src/world/partition.rs
use crate::core::constants::{MAX_NUMBER_OF_GRIDS, SIZE_OF_GRIDS};
use crate::core::types::{compute_grid_coord, game_time_ms, GridCoord, ObjectGuid, PartitionId, Position};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Near-square grid of partitions laid over the map's 64x64 grid squares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    count: u32,
    cols: u32,
    rows: u32,
    cell_width: u32,
    cell_height: u32,
}

impl PartitionLayout {
    pub fn new(count: u32) -> Self {
        let count = count.max(1);
        let cols = ((count as f32).sqrt().floor() as u32).max(1);
        let rows = count.div_ceil(cols);
        PartitionLayout {
            count,
            cols,
            rows,
            cell_width: MAX_NUMBER_OF_GRIDS.div_ceil(cols),
            cell_height: MAX_NUMBER_OF_GRIDS.div_ceil(rows),
        }
    }

    #[inline]
    pub fn partition_count(&self) -> u32 {
        self.count
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    #[inline]
    fn column_row(&self, coord: GridCoord) -> (u32, u32) {
        let col = (coord.x / self.cell_width).min(self.cols - 1);
        let row = (coord.y / self.cell_height).min(self.rows - 1);
        (col, row)
    }

    /// Partition ids are 1-based.
    pub fn partition_for_grid(&self, coord: GridCoord) -> PartitionId {
        if self.count <= 1 {
            return 1;
        }
        let (col, row) = self.column_row(coord);
        let index = (row * self.cols + col).min(self.count - 1);
        index + 1
    }

    #[inline]
    pub fn partition_for_position(&self, x: f32, y: f32) -> PartitionId {
        self.partition_for_grid(compute_grid_coord(x, y))
    }

    /// True when (x, y) lies within `overlap` yards (at least one grid) of the
    /// edge of its partition cell.
    pub fn is_near_boundary(&self, x: f32, y: f32, overlap: f32) -> bool {
        if self.count <= 1 {
            return false;
        }
        let overlap_grids = ((overlap / SIZE_OF_GRIDS).ceil() as u32).max(1);
        let coord = compute_grid_coord(x, y);
        let (col, row) = self.column_row(coord);

        let start_x = col * self.cell_width;
        let end_x = (start_x + self.cell_width - 1).min(MAX_NUMBER_OF_GRIDS - 1);
        let start_y = row * self.cell_height;
        let end_y = (start_y + self.cell_height - 1).min(MAX_NUMBER_OF_GRIDS - 1);

        coord.x - start_x < overlap_grids
            || end_x.saturating_sub(coord.x) < overlap_grids
            || coord.y - start_y < overlap_grids
            || end_y.saturating_sub(coord.y) < overlap_grids
    }

    /// Zero-based bucket slot for a partition id, clamped into range.
    #[inline]
    pub fn bucket_index(&self, partition_id: PartitionId) -> usize {
        partition_id.saturating_sub(1).min(self.count - 1) as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct PartitionOverride {
    partition_id: PartitionId,
    expires_ms: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub players: u32,
    pub creatures: u32,
    pub boundary_objects: u32,
}

/// Decides which partition owns an object right now.
///
/// Lookup order: sticky ownership (players only), then an unexpired timed
/// override, then the position on the partition grid.
pub struct PartitionAssignment {
    layout: PartitionLayout,
    border_overlap: f32,
    ownership: DashMap<ObjectGuid, PartitionId>,
    overrides: DashMap<ObjectGuid, PartitionOverride>,
    stats: DashMap<PartitionId, PartitionStats>,
    combat_handoffs: AtomicU32,
    path_handoffs: AtomicU32,
}

impl PartitionAssignment {
    pub fn new(partition_count: u32, border_overlap: f32) -> Self {
        PartitionAssignment {
            layout: PartitionLayout::new(partition_count),
            border_overlap,
            ownership: DashMap::new(),
            overrides: DashMap::new(),
            stats: DashMap::new(),
            combat_handoffs: AtomicU32::new(0),
            path_handoffs: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    #[inline]
    pub fn partition_count(&self) -> u32 {
        self.layout.partition_count()
    }

    pub fn partition_for(&self, guid: ObjectGuid, position: Position) -> PartitionId {
        if !guid.is_empty() {
            if let Some(partition_id) = self.persistent_partition(guid) {
                return partition_id;
            }
            if let Some(partition_id) = self.active_override(guid) {
                return partition_id;
            }
        }
        self.layout.partition_for_position(position.x, position.y)
    }

    fn active_override(&self, guid: ObjectGuid) -> Option<PartitionId> {
        let entry = *self.overrides.get(&guid)?;
        if entry.expires_ms >= game_time_ms() {
            return Some(entry.partition_id);
        }
        self.overrides.remove_if(&guid, |_, current| current.expires_ms == entry.expires_ms);
        None
    }

    /// Records sticky ownership for a player. Returns true when it changed.
    pub fn persist_ownership(&self, guid: ObjectGuid, partition_id: PartitionId) -> bool {
        if guid.is_empty() || !guid.is_player() {
            return false;
        }
        let previous = self.ownership.insert(guid, partition_id);
        previous != Some(partition_id)
    }

    pub fn persistent_partition(&self, guid: ObjectGuid) -> Option<PartitionId> {
        self.ownership.get(&guid).map(|partition_id| *partition_id)
    }

    pub fn clear_ownership(&self, guid: ObjectGuid) {
        self.ownership.remove(&guid);
    }

    pub fn set_partition_override(&self, guid: ObjectGuid, partition_id: PartitionId, duration_ms: u64) {
        if guid.is_empty() {
            return;
        }
        let expires_ms = game_time_ms().saturating_add(duration_ms);
        self.overrides.insert(guid, PartitionOverride { partition_id, expires_ms });
    }

    pub fn clear_partition_override(&self, guid: ObjectGuid) {
        self.overrides.remove(&guid);
    }

    pub fn is_near_partition_boundary(&self, x: f32, y: f32) -> bool {
        self.layout.is_near_boundary(x, y, self.border_overlap)
    }

    pub fn record_combat_handoff(&self) {
        self.combat_handoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_path_handoff(&self) {
        self.path_handoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consume_combat_handoffs(&self) -> u32 {
        self.combat_handoffs.swap(0, Ordering::Relaxed)
    }

    pub fn consume_path_handoffs(&self) -> u32 {
        self.path_handoffs.swap(0, Ordering::Relaxed)
    }

    pub fn update_stats(&self, partition_id: PartitionId, stats: PartitionStats) {
        self.stats.insert(partition_id, stats);
    }

    pub fn stats(&self, partition_id: PartitionId) -> Option<PartitionStats> {
        self.stats.get(&partition_id).map(|stats| *stats)
    }
}
