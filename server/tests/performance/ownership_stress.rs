// map_partition_engine/server/tests/performance/ownership_stress.rs
#[path = "../common/mod.rs"]
mod common;

use common::*;
use map_partition_core::core::types::{ObjectGuid, Position, TypeId};
use map_partition_core::PartitionContext;
use metrics::histogram;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const UNITS: u64 = 400;
const TICKS: usize = 200;

fn random_position(rng: &mut impl Rng) -> Position {
    Position::xy(rng.gen_range(-8000.0..8000.0), rng.gen_range(-8000.0..8000.0))
}

#[test]
fn stress_ownership_churn_keeps_lists_exclusive() {
    let hooks = RecordingHooks::with_update_callback(|scope, object| {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(0.2) {
            scope.map.relocate_object(scope.ctx, object, random_position(&mut rng));
        }
    });
    let map = pooled_map(partition_config(8), hooks, 4);

    let mut rng = rand::thread_rng();
    for counter in 1..=UNITS {
        let position = random_position(&mut rng);
        spawn(&map, &creature(counter, (position.x, position.y)));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let churn = {
        let map = Arc::clone(&map);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let ctx = PartitionContext::global();
            let mut rng = rand::thread_rng();
            let mut next = UNITS + 1;
            while !stop.load(Ordering::Relaxed) {
                let position = random_position(&mut rng);
                map.add_to_map(&ctx, creature(next, (position.x, position.y)));
                map.remove_from_map(&ctx, ObjectGuid::new(TypeId::Unit, rng.gen_range(1..next)));
                next += 1;
                std::thread::yield_now();
            }
        })
    };

    for _ in 0..TICKS {
        let start = Instant::now();
        map.update(50);
        histogram!("partition_tick_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
    }
    stop.store(true, Ordering::Relaxed);
    churn.join().expect("churn thread panicked");

    map.update(50);
    let lists = map.registry().read();
    assert!(lists.is_consistent());
    let mut seen = HashSet::new();
    for partition_id in lists.partitions() {
        for object in lists.objects(partition_id) {
            assert!(seen.insert(object.guid()), "{} registered twice", object.guid());
            assert!(object.is_in_world());
            assert_eq!(map.partition_id_for_unit(object), partition_id);
        }
    }
    assert_eq!(seen.len(), map.objects().len());
}
