// map_partition_engine/server/src/main.rs
use map_partition_core::concurrent::thread_pools::PartitionWorkerPool;
use map_partition_core::core::config::EngineConfig;
use map_partition_core::core::types::{ObjectGuid, Position, TypeId};
use map_partition_core::operational::monitoring::metrics::{describe_partition_metrics, init_logging, install_prometheus_exporter};
use map_partition_core::world::objects::WorldObject;
use map_partition_core::world::relays::{MotionAction, PointRelay, ThreatRelay};
use map_partition_core::{ObjectRef, PartitionContext, PartitionedMap, WorkerScope, WorldHooks};

use anyhow::Context;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{error, info, warn};

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Half the size of the square the soak units wander in, in yards.
const SOAK_AREA_HALF_EXTENT: f32 = 8000.0;

/// Collaborator that produces cross-partition traffic: every updated unit
/// picks a random other unit and either relays an effect to it or applies
/// it directly, and now and then wanders far enough to change owner.
struct SoakHooks {
    targets: Vec<ObjectGuid>,
    relayed: AtomicU64,
    direct: AtomicU64,
    applied: AtomicU64,
}

impl SoakHooks {
    fn new(targets: Vec<ObjectGuid>) -> Self {
        SoakHooks {
            targets,
            relayed: AtomicU64::new(0),
            direct: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    fn count_applied(&self) {
        self.applied.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

impl WorldHooks for SoakHooks {
    fn update_object(&self, scope: &WorkerScope<'_>, object: &ObjectRef, _diff_ms: u32) {
        let mut rng = rand::thread_rng();
        let Some(&target_guid) = self.targets.get(rng.gen_range(0..self.targets.len().max(1))) else {
            return;
        };
        let Some(target) = scope.map.objects().resolve_in_world(target_guid) else {
            return;
        };

        match scope.map.try_get_relay_target_partition(scope.ctx, &target) {
            Some(partition_id) => {
                let queued = match rng.gen_range(0..4) {
                    0 => scope.map.queue_partition_threat_relay(partition_id, target.guid(), object.guid(), 10.0, 1, 0),
                    1 => scope.map.queue_partition_combat_relay(partition_id, target.guid(), object.guid(), true),
                    2 => {
                        let destination = target.position();
                        scope.map.queue_partition_point_relay(partition_id, PointRelay::new(target.guid(), 1, destination))
                    }
                    _ => scope.map.queue_partition_motion_relay(
                        partition_id,
                        target.guid(),
                        MotionAction::FaceObject { target: object.guid(), time_ms: 500 },
                    ),
                };
                if queued {
                    self.relayed.fetch_add(1, AtomicOrdering::Relaxed);
                }
            }
            None => {
                self.direct.fetch_add(1, AtomicOrdering::Relaxed);
            }
        }

        if rng.gen_bool(0.01) {
            let position = object.position();
            let destination = Position::new(
                (position.x + rng.gen_range(-600.0..600.0)).clamp(-SOAK_AREA_HALF_EXTENT, SOAK_AREA_HALF_EXTENT),
                (position.y + rng.gen_range(-600.0..600.0)).clamp(-SOAK_AREA_HALF_EXTENT, SOAK_AREA_HALF_EXTENT),
                position.z,
                position.o,
            );
            scope.map.relocate_object(scope.ctx, object, destination);
        }
    }

    fn add_threat(&self, _: &WorkerScope<'_>, _: &ObjectRef, _: &ObjectRef, _: &ThreatRelay) {
        self.count_applied();
    }

    fn start_combat(&self, _: &WorkerScope<'_>, _: &ObjectRef, _: &ObjectRef, _: bool) {
        self.count_applied();
    }

    fn move_point(&self, _: &WorkerScope<'_>, _: &ObjectRef, _: &PointRelay) {
        self.count_applied();
    }

    fn apply_motion(&self, _: &WorkerScope<'_>, _: &ObjectRef, _: &MotionAction, _: Option<&ObjectRef>) {
        self.count_applied();
    }
}

fn spawn_soak_units(count: usize) -> Vec<Arc<WorldObject>> {
    let mut rng = rand::thread_rng();
    (1..=count as u64)
        .map(|counter| {
            let position = Position::xy(
                rng.gen_range(-SOAK_AREA_HALF_EXTENT..SOAK_AREA_HALF_EXTENT),
                rng.gen_range(-SOAK_AREA_HALF_EXTENT..SOAK_AREA_HALF_EXTENT),
            );
            Arc::new(WorldObject::new(ObjectGuid::new(TypeId::Unit, counter), position).with_spawn_id(counter as u32))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {}", panic_info);
        if let Some(location) = panic_info.location() {
            eprintln!("Location: {}:{}:{}", location.file(), location.line(), location.column());
        }
        eprintln!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
    }));

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {:?}", e);
        return Err(e);
    }

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("Failed to load config from {}", path))?,
        None => EngineConfig::default(),
    };
    info!(
        map = config.map_id,
        partitions = config.partitions.partition_count,
        units = config.soak_units,
        ticks = config.soak_ticks,
        "Partition soak starting"
    );

    match config.metrics_port {
        Some(port) => {
            install_prometheus_exporter(port)?;
            info!("Prometheus exporter listening on 0.0.0.0:{}", port);
        }
        None => describe_partition_metrics(),
    }

    let pool = Arc::new(PartitionWorkerPool::new(&config.thread_pools).context("Thread pool initialization failed")?);

    let units = spawn_soak_units(config.soak_units);
    let hooks = Arc::new(SoakHooks::new(units.iter().map(|unit| unit.guid()).collect()));
    let map = Arc::new(
        PartitionedMap::new(config.map_id, config.partitions.clone(), hooks.clone(), Some(pool))
            .context("Failed to create partitioned map")?,
    );

    let ctx = PartitionContext::global();
    for unit in units {
        map.add_to_map(&ctx, unit);
    }
    info!(objects = map.registry().total_len(), "Soak units registered");

    let tick_duration = Duration::from_millis(config.tick_interval_ms());
    let diff_ms = config.tick_interval_ms() as u32;
    let mut tick_timer = interval(tick_duration);

    for tick in 0..config.soak_ticks {
        tick_timer.tick().await;
        let frame_start = Instant::now();

        let map_for_tick = Arc::clone(&map);
        if let Err(e) = tokio::task::spawn_blocking(move || map_for_tick.update(diff_ms)).await {
            error!("Map update failed: {:?}", e);
            continue;
        }

        let frame_time = frame_start.elapsed();
        if frame_time > tick_duration + Duration::from_millis(5) {
            warn!("Tick {} took too long: {:?}", tick, frame_time);
        }
        if tick % 20 == 0 {
            info!(
                tick,
                relayed = hooks.relayed.load(AtomicOrdering::Relaxed),
                direct = hooks.direct.load(AtomicOrdering::Relaxed),
                applied = hooks.applied.load(AtomicOrdering::Relaxed),
                budget = map.scheduler().object_budget(),
                "Soak progress"
            );
        }
    }

    info!(
        relayed = hooks.relayed.load(AtomicOrdering::Relaxed),
        applied = hooks.applied.load(AtomicOrdering::Relaxed),
        "Partition soak finished"
    );
    Ok(())
}
