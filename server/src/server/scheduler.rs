// map_partition_engine/server/src/server/scheduler.rs
use super::context::{PartitionContext, WorkerScope};
use super::map::PartitionedMap;
use crate::concurrent::thread_pools::PartitionWorkerPool;
use crate::core::config::PartitionConfig;
use crate::core::constants::MIN_OBJECT_UPDATE_BUDGET;
use crate::core::types::{game_time_ms, PartitionId, GLOBAL_PARTITION};
use crate::operational::monitoring::metrics::{record_cycle_time, record_scheduler_limits};
use crate::world::objects::WorldObject;
use crate::world::partition::PartitionStats;
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

struct BudgetState {
    total: usize,
    per_partition: usize,
    cursors: AHashMap<PartitionId, usize>,
    rotation: usize,
}

struct CycleState {
    in_progress: bool,
    generation: u64,
    partition_count: u32,
    next_partition: PartitionId,
    in_flight: usize,
    completed: u32,
    diff_ms: u32,
    epoch: Instant,
}

/// Per-cycle worker timings, accumulated from every partition task.
struct CycleTelemetry {
    scheduled: AtomicU32,
    started: AtomicU32,
    completed: AtomicU32,
    queue_wait_total_ms: AtomicU64,
    queue_wait_max_ms: AtomicU64,
    run_total_ms: AtomicU64,
    run_max_ms: AtomicU64,
    first_start_ms: AtomicU64,
    last_end_ms: AtomicU64,
}

impl CycleTelemetry {
    fn new() -> Self {
        CycleTelemetry {
            scheduled: AtomicU32::new(0),
            started: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            queue_wait_total_ms: AtomicU64::new(0),
            queue_wait_max_ms: AtomicU64::new(0),
            run_total_ms: AtomicU64::new(0),
            run_max_ms: AtomicU64::new(0),
            first_start_ms: AtomicU64::new(u64::MAX),
            last_end_ms: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        for counter in [&self.scheduled, &self.started, &self.completed] {
            counter.store(0, Ordering::Relaxed);
        }
        for value in [
            &self.queue_wait_total_ms,
            &self.queue_wait_max_ms,
            &self.run_total_ms,
            &self.run_max_ms,
            &self.last_end_ms,
        ] {
            value.store(0, Ordering::Relaxed);
        }
        self.first_start_ms.store(u64::MAX, Ordering::Relaxed);
    }
}

/// Summary of the last finished cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub partitions: u32,
    pub cycle_ms: u64,
    pub queue_wait_total_ms: u64,
    pub queue_wait_max_ms: u64,
    pub run_total_ms: u64,
    pub run_max_ms: u64,
    /// First worker start to last worker end.
    pub busy_window_ms: u64,
    /// Cycle time outside the busy window.
    pub barrier_ms: u64,
}

/// Decides how many objects each partition updates per tick and how many
/// partitions run at once, and keeps the timing of each cycle.
pub struct PartitionScheduler {
    budget: Mutex<BudgetState>,
    base_budget: usize,
    object_budget: AtomicUsize,
    base_visibility_budget: usize,
    visibility_budget: AtomicUsize,
    carry_over: bool,
    configured_in_flight: usize,
    max_in_flight: usize,
    in_flight_limit: AtomicUsize,
    cycle: Mutex<CycleState>,
    progress: Condvar,
    telemetry: CycleTelemetry,
    last_summary: Mutex<CycleSummary>,
    last_slow_log_ms: AtomicU64,
}

impl PartitionScheduler {
    pub fn new(config: &PartitionConfig, worker_threads: usize) -> Self {
        let max_in_flight = config.in_flight_limit.min(worker_threads.max(1)).max(1);
        PartitionScheduler {
            budget: Mutex::new(BudgetState {
                total: config.object_update_budget,
                per_partition: config.object_update_budget,
                cursors: AHashMap::new(),
                rotation: 0,
            }),
            base_budget: config.object_update_budget,
            object_budget: AtomicUsize::new(config.object_update_budget),
            base_visibility_budget: config.deferred_visibility_budget,
            visibility_budget: AtomicUsize::new(config.deferred_visibility_budget),
            carry_over: config.carry_over,
            configured_in_flight: config.in_flight_limit,
            max_in_flight,
            in_flight_limit: AtomicUsize::new(max_in_flight),
            cycle: Mutex::new(CycleState {
                in_progress: false,
                generation: 0,
                partition_count: config.partition_count,
                next_partition: 1,
                in_flight: 0,
                completed: 0,
                diff_ms: 0,
                epoch: Instant::now(),
            }),
            progress: Condvar::new(),
            telemetry: CycleTelemetry::new(),
            last_summary: Mutex::new(CycleSummary::default()),
            last_slow_log_ms: AtomicU64::new(0),
        }
    }

    /// Sets this tick's object budget and splits it across partitions.
    /// Without carry-over the window start rotates every tick.
    pub fn prepare_partition_object_update_budget(&self, partition_count: u32, tick_diff_ms: u32) -> usize {
        let total = self.object_budget.load(Ordering::Relaxed).max(1);
        let mut budget = self.budget.lock();
        budget.total = total;
        budget.per_partition = (total / partition_count.max(1) as usize).max(1);
        if !self.carry_over {
            budget.cursors.clear();
            budget.rotation = budget.rotation.wrapping_add(1);
        }
        trace!(total, per_partition = budget.per_partition, tick_diff_ms, "Prepared partition update budget");
        total
    }

    /// Contiguous slice `(start, count)` of a partition's `total_objects`
    /// to update this tick. Indices wrap modulo `total_objects`.
    pub fn get_partition_object_update_window(&self, partition_id: PartitionId, total_objects: usize) -> (usize, usize) {
        if total_objects == 0 {
            return (0, 0);
        }
        let mut budget = self.budget.lock();
        let count = budget.per_partition.min(total_objects);
        let start = if self.carry_over {
            let cursor = budget.cursors.entry(partition_id).or_insert(0);
            let start = *cursor % total_objects;
            *cursor = (start + count) % total_objects;
            start
        } else {
            budget.rotation.wrapping_mul(count) % total_objects
        };
        (start, count)
    }

    #[inline]
    pub fn object_budget(&self) -> usize {
        self.object_budget.load(Ordering::Relaxed)
    }

    /// Deferred visibility updates processed per pass.
    #[inline]
    pub fn visibility_budget(&self) -> usize {
        self.visibility_budget.load(Ordering::Relaxed)
    }

    /// Re-derives the visibility budget from how long the last tick took:
    /// halved at 200 ms and above, three quarters at 120 ms, doubled at
    /// 35 ms and below.
    pub fn tune_visibility_budget(&self, tick_diff_ms: u32) -> usize {
        let base = self.base_visibility_budget;
        let budget = if tick_diff_ms >= 200 {
            base / 2
        } else if tick_diff_ms >= 120 {
            base * 3 / 4
        } else if tick_diff_ms <= 35 {
            base * 2
        } else {
            base
        }
        .max(1);
        if self.visibility_budget.swap(budget, Ordering::Relaxed) != budget {
            trace!(budget, tick_diff_ms, "Adjusted deferred visibility budget");
        }
        budget
    }

    #[inline]
    pub fn in_flight_limit(&self) -> usize {
        self.in_flight_limit.load(Ordering::Relaxed)
    }

    pub fn last_summary(&self) -> CycleSummary {
        *self.last_summary.lock()
    }

    pub fn is_cycle_in_progress(&self) -> bool {
        self.cycle.lock().in_progress
    }

    /// Drops the running cycle. Completions still arriving from it are
    /// ignored.
    pub fn abandon_cycle(&self) {
        let mut cycle = self.cycle.lock();
        if cycle.in_progress {
            cycle.in_progress = false;
            cycle.generation += 1;
            cycle.in_flight = 0;
            debug!(generation = cycle.generation, "Abandoned partition cycle");
            self.progress.notify_all();
        }
    }

    fn in_flight_target(&self, remaining: u32) -> usize {
        let cap = self.max_in_flight;
        let mut target = self.in_flight_limit().clamp(1, cap);
        let scheduled = self.telemetry.scheduled.load(Ordering::Relaxed);
        let started = self.telemetry.started.load(Ordering::Relaxed);
        let pending = scheduled.saturating_sub(started) as usize;
        if pending > cap * 2 {
            target = (target / 2).max(1);
        }
        target.min(remaining.max(1) as usize)
    }

    fn record_run(&self, epoch: Instant, scheduled_at: Instant, started_at: Instant, ended_at: Instant) {
        let wait_ms = started_at.duration_since(scheduled_at).as_millis() as u64;
        let run_ms = ended_at.duration_since(started_at).as_millis() as u64;
        let t = &self.telemetry;
        t.completed.fetch_add(1, Ordering::Relaxed);
        t.queue_wait_total_ms.fetch_add(wait_ms, Ordering::Relaxed);
        t.queue_wait_max_ms.fetch_max(wait_ms, Ordering::Relaxed);
        t.run_total_ms.fetch_add(run_ms, Ordering::Relaxed);
        t.run_max_ms.fetch_max(run_ms, Ordering::Relaxed);
        t.first_start_ms
            .fetch_min(started_at.saturating_duration_since(epoch).as_millis() as u64, Ordering::Relaxed);
        t.last_end_ms
            .fetch_max(ended_at.saturating_duration_since(epoch).as_millis() as u64, Ordering::Relaxed);
    }

    fn complete_partition(
        &self,
        generation: u64,
        partition_id: PartitionId,
        scheduled_at: Instant,
        started_at: Instant,
        ended_at: Instant,
    ) {
        let mut cycle = self.cycle.lock();
        if !cycle.in_progress || cycle.generation != generation {
            trace!(partition = partition_id, generation, "Ignoring completion from a stale cycle");
            return;
        }
        self.record_run(cycle.epoch, scheduled_at, started_at, ended_at);
        cycle.in_flight = cycle.in_flight.saturating_sub(1);
        cycle.completed += 1;
        self.progress.notify_all();
    }

    fn summarize(&self, partitions: u32, cycle_ms: u64) -> CycleSummary {
        let t = &self.telemetry;
        let first_start = t.first_start_ms.load(Ordering::Relaxed);
        let last_end = t.last_end_ms.load(Ordering::Relaxed);
        let busy_window_ms = if first_start == u64::MAX { 0 } else { last_end.saturating_sub(first_start) };
        let summary = CycleSummary {
            partitions,
            cycle_ms,
            queue_wait_total_ms: t.queue_wait_total_ms.load(Ordering::Relaxed),
            queue_wait_max_ms: t.queue_wait_max_ms.load(Ordering::Relaxed),
            run_total_ms: t.run_total_ms.load(Ordering::Relaxed),
            run_max_ms: t.run_max_ms.load(Ordering::Relaxed),
            busy_window_ms,
            barrier_ms: cycle_ms.saturating_sub(busy_window_ms),
        };
        *self.last_summary.lock() = summary;
        summary
    }

    /// Shrinks the budget and concurrency after a cycle that overran its
    /// tick, and recovers them toward the configured values after fast ones.
    fn tune(&self, summary: &CycleSummary, tick_diff_ms: u32) {
        let tick_ms = u64::from(tick_diff_ms.max(1));
        let floor = MIN_OBJECT_UPDATE_BUDGET.min(self.base_budget);
        let budget = self.object_budget();
        let limit = self.in_flight_limit();

        let (next_budget, next_limit) = if summary.cycle_ms > tick_ms {
            let limit = if summary.queue_wait_max_ms > summary.run_max_ms { limit.saturating_sub(1) } else { limit };
            ((budget * 3 / 4).max(floor), limit.max(1))
        } else if summary.cycle_ms * 2 <= tick_ms {
            ((budget + (budget / 8).max(1)).min(self.base_budget), (limit + 1).min(self.max_in_flight))
        } else {
            (budget, limit)
        };

        self.object_budget.store(next_budget, Ordering::Relaxed);
        self.in_flight_limit.store(next_limit, Ordering::Relaxed);
        if next_budget != budget || next_limit != limit {
            debug!(
                budget = next_budget,
                in_flight_limit = next_limit,
                configured_in_flight = self.configured_in_flight,
                cycle_ms = summary.cycle_ms,
                "Adjusted partition scheduling limits"
            );
        }
    }

    /// True when a slow-cycle warning may be logged now.
    fn claim_slow_log(&self, interval_ms: u64) -> bool {
        let now = game_time_ms();
        let last = self.last_slow_log_ms.load(Ordering::Relaxed);
        if last != 0 && now.saturating_sub(last) < interval_ms {
            return false;
        }
        self.last_slow_log_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl PartitionedMap {
    /// Advances the current partition cycle, starting one if none is
    /// running. Launches workers up to the in-flight limit, then blocks until
    /// at least one finishes. Returns true once every partition of the cycle
    /// has completed.
    pub fn schedule_partition_updates(self: &Arc<Self>, t_diff: u32, s_diff: u32) -> bool {
        let pool = match self.pool() {
            Some(pool) if self.is_partitioned() && self.config().parallel => Arc::clone(pool),
            _ => {
                self.run_serial_cycle(t_diff, s_diff);
                return true;
            }
        };

        let scheduler = &self.scheduler;
        let mut cycle = scheduler.cycle.lock();
        if !cycle.in_progress {
            drop(cycle);
            let epoch = Instant::now();
            self.begin_partition_cycle(t_diff);
            cycle = scheduler.cycle.lock();
            cycle.in_progress = true;
            cycle.generation += 1;
            cycle.partition_count = self.partition_count();
            cycle.next_partition = 1;
            cycle.in_flight = 0;
            cycle.completed = 0;
            cycle.diff_ms = t_diff;
            cycle.epoch = epoch;
        }

        let generation = cycle.generation;
        let partition_count = cycle.partition_count;
        let remaining = partition_count + 1 - cycle.next_partition.min(partition_count + 1);
        let target = scheduler.in_flight_target(remaining);
        while cycle.in_flight < target && cycle.next_partition <= partition_count {
            let partition_id = cycle.next_partition;
            cycle.next_partition += 1;
            cycle.in_flight += 1;
            self.launch_partition_worker(&pool, partition_id, generation, cycle.diff_ms);
        }

        let completed_before = cycle.completed;
        while cycle.in_progress
            && cycle.generation == generation
            && cycle.completed < partition_count
            && cycle.completed == completed_before
        {
            scheduler.progress.wait(&mut cycle);
        }

        if !cycle.in_progress || cycle.generation != generation {
            return true;
        }
        if cycle.completed < partition_count {
            return false;
        }

        cycle.in_progress = false;
        let (diff_ms, epoch) = (cycle.diff_ms, cycle.epoch);
        drop(cycle);
        self.finish_partition_cycle(diff_ms, s_diff, epoch);
        true
    }

    fn launch_partition_worker(self: &Arc<Self>, pool: &PartitionWorkerPool, partition_id: PartitionId, generation: u64, diff_ms: u32) {
        let map = Arc::clone(self);
        let scheduled_at = Instant::now();
        self.scheduler.telemetry.scheduled.fetch_add(1, Ordering::Relaxed);
        pool.spawn(move || {
            let started_at = Instant::now();
            map.scheduler.telemetry.started.fetch_add(1, Ordering::Relaxed);
            map.run_partition_worker(partition_id, diff_ms);
            map.scheduler
                .complete_partition(generation, partition_id, scheduled_at, started_at, Instant::now());
        });
    }

    /// Runs every partition on the calling thread. An unpartitioned map runs
    /// a single global worker.
    fn run_serial_cycle(&self, t_diff: u32, s_diff: u32) {
        let epoch = Instant::now();
        self.begin_partition_cycle(t_diff);
        let partitions: Vec<PartitionId> = if self.is_partitioned() {
            (1..=self.partition_count()).collect()
        } else {
            vec![GLOBAL_PARTITION]
        };
        for partition_id in partitions {
            let started_at = Instant::now();
            self.run_partition_worker(partition_id, t_diff);
            self.scheduler.record_run(epoch, started_at, started_at, Instant::now());
        }
        self.finish_partition_cycle(t_diff, s_diff, epoch);
    }

    fn begin_partition_cycle(&self, t_diff: u32) {
        self.flush_pending_adds();
        self.apply_queued_partitioned_ownership_updates();
        self.apply_queued_partitioned_removals();
        self.build_player_buckets();
        self.scheduler.telemetry.reset();
        let partitions = if self.is_partitioned() { self.partition_count() } else { 1 };
        self.scheduler.prepare_partition_object_update_budget(partitions, t_diff);
    }

    fn finish_partition_cycle(&self, t_diff: u32, s_diff: u32, epoch: Instant) {
        let elapsed = epoch.elapsed();
        let cycle_ms = elapsed.as_millis() as u64;
        let partitions = self.scheduler.telemetry.completed.load(Ordering::Relaxed);
        let summary = self.scheduler.summarize(partitions, cycle_ms);

        record_cycle_time(self.map_id(), elapsed.as_secs_f64());
        self.scheduler.tune(&summary, t_diff);
        record_scheduler_limits(self.map_id(), self.scheduler.in_flight_limit(), self.scheduler.object_budget());

        let config = self.config();
        if cycle_ms >= config.slow_cycle_threshold_ms && self.scheduler.claim_slow_log(config.slow_cycle_log_interval_ms) {
            warn!(
                map = self.map_id(),
                cycle_ms,
                partitions,
                busy_window_ms = summary.busy_window_ms,
                barrier_ms = summary.barrier_ms,
                queue_wait_total_ms = summary.queue_wait_total_ms,
                queue_wait_max_ms = summary.queue_wait_max_ms,
                run_total_ms = summary.run_total_ms,
                run_max_ms = summary.run_max_ms,
                in_flight_limit = self.scheduler.in_flight_limit(),
                budget = self.scheduler.object_budget(),
                s_diff,
                "Slow partition update cycle"
            );
        }
    }

    /// Groups in-world players by owning partition for this cycle and
    /// refreshes per-partition stats.
    pub fn build_player_buckets(&self) {
        let partitioned = self.is_partitioned();
        let bucket_count = if partitioned { self.partition_count() as usize } else { 1 };
        let layout = self.assignment().layout();
        let mut buckets: Vec<Vec<Arc<WorldObject>>> = vec![Vec::new(); bucket_count];
        let mut boundary = vec![0u32; bucket_count];

        for player in self.objects().players_in_world() {
            let index = if partitioned {
                layout.bucket_index(self.partition_id_for_unit(&player))
            } else {
                0
            };
            let position = player.position();
            if partitioned && self.assignment().is_near_partition_boundary(position.x, position.y) {
                boundary[index] += 1;
            }
            buckets[index].push(player);
        }

        if partitioned {
            for (index, players) in buckets.iter().enumerate() {
                let partition_id = index as PartitionId + 1;
                self.assignment().update_stats(
                    partition_id,
                    PartitionStats {
                        players: players.len() as u32,
                        creatures: self.registry().len(partition_id) as u32,
                        boundary_objects: boundary[index],
                    },
                );
            }
        }
        self.player_buckets.store(Arc::new(buckets));
    }

    /// Players bucketed for `partition_id` in the current cycle.
    pub fn players_for_partition(&self, partition_id: PartitionId) -> Vec<Arc<WorldObject>> {
        let buckets = self.player_buckets.load();
        let index = if self.is_partitioned() {
            self.assignment().layout().bucket_index(partition_id)
        } else {
            0
        };
        buckets.get(index).cloned().unwrap_or_default()
    }

    /// One map tick: the partition cycle, then the single-threaded apply
    /// passes. Relocations run before visibility so refreshes they queue are
    /// serviced in the same tick.
    pub fn update(self: &Arc<Self>, t_diff: u32) {
        self.advance_tick();
        self.reset_marked_cells();
        self.scheduler.tune_visibility_budget(t_diff);

        while !self.schedule_partition_updates(t_diff, t_diff) {}

        self.apply_queued_partitioned_ownership_updates();
        self.apply_queued_partitioned_removals();

        for guid in self.locks().take_delayed_visibility() {
            self.queue_deferred_visibility_update(guid);
        }
        self.process_deferred_player_relocations();
        self.process_deferred_visibility_updates();

        let updated: Vec<Arc<WorldObject>> = self
            .locks()
            .take_update_objects()
            .into_iter()
            .filter_map(|guid| self.objects().resolve_in_world(guid))
            .collect();
        if !updated.is_empty() {
            let ctx = PartitionContext::global();
            self.hooks().send_object_updates(&WorkerScope::new(self, &ctx), &updated);
        }

        let combat_handoffs = self.assignment().consume_combat_handoffs();
        let path_handoffs = self.assignment().consume_path_handoffs();
        if combat_handoffs > 0 || path_handoffs > 0 {
            debug!(map = self.map_id(), combat_handoffs, path_handoffs, "Partition handoffs this tick");
        }
    }
}
