// map_partition_engine/server/src/server/worker.rs
use super::context::{PartitionContext, VisibilityDeferGuard, WorkerScope};
use super::map::PartitionedMap;
use crate::core::types::{PartitionId, GLOBAL_PARTITION};
use std::time::Instant;
use tracing::warn;

/// Counts from one partition worker run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRunStats {
    pub relays_applied: usize,
    pub players_updated: usize,
    pub objects_updated: usize,
    pub objects_retired: usize,
}

impl PartitionedMap {
    /// Runs one tick of `partition_id`: pending relays first, then the
    /// partition's players, then its window of non-player objects.
    pub fn run_partition_worker(&self, partition_id: PartitionId, diff_ms: u32) -> WorkerRunStats {
        let ctx = PartitionContext::new(partition_id);
        let scope = WorkerScope::new(self, &ctx);
        let hooks = self.hooks();
        let mut stats = WorkerRunStats::default();
        let started = Instant::now();

        if self.has_partition_relay_work_pending(partition_id) {
            stats.relays_applied = self.process_partition_relays_in(&ctx).applied;
        }
        let relays_done = Instant::now();

        for player in self.players_for_partition(partition_id) {
            if !player.is_in_world() {
                continue;
            }
            player.set_current_update_partition(partition_id);
            hooks.update_player(&scope, &player, diff_ms);
            player.set_current_update_partition(GLOBAL_PARTITION);
            stats.players_updated += 1;
        }
        let players_done = Instant::now();

        let objects = self.collect_partitioned_updatable_objects(partition_id);
        let total = objects.len();
        let (start, count) = self.scheduler.get_partition_object_update_window(partition_id, total);
        {
            let _defer = VisibilityDeferGuard::new(&ctx);
            for offset in 0..count {
                let object = &objects[(start + offset) % total];
                if !object.is_in_world() {
                    continue;
                }
                self.mark_cell(object.cell_id());
                object.set_current_update_partition(partition_id);
                hooks.update_object(&scope, object, diff_ms);
                object.set_current_update_partition(GLOBAL_PARTITION);
                stats.objects_updated += 1;

                if !hooks.wants_update(object) {
                    self.remove_from_partitioned_update_list(&ctx, object);
                    stats.objects_retired += 1;
                }
            }
        }

        let total_ms = started.elapsed().as_millis() as u64;
        if total_ms >= self.config().slow_worker_threshold_ms {
            warn!(
                map = self.map_id(),
                partition = partition_id,
                total_ms,
                relay_ms = relays_done.duration_since(started).as_millis() as u64,
                player_ms = players_done.duration_since(relays_done).as_millis() as u64,
                object_ms = players_done.elapsed().as_millis() as u64,
                players = stats.players_updated,
                objects = stats.objects_updated,
                window_start = start,
                window_total = total,
                relay_backlog = self.relay_backlog(partition_id),
                "Slow partition worker"
            );
        }
        stats
    }
}
