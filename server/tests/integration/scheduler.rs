// map_partition_engine/server/tests/integration/scheduler.rs
#[path = "../common/mod.rs"]
mod common;

use common::*;
use map_partition_core::core::config::PartitionConfig;
use map_partition_core::core::types::ObjectGuid;
use map_partition_core::world::objects::WorldObject;
use std::sync::Arc;

const TICK_MS: u32 = 50;

fn one_per_partition() -> Vec<Arc<WorldObject>> {
    vec![creature(1, P1), creature(2, P2), creature(3, P3), creature(4, P4)]
}

fn updates_by_partition(effects: &[Effect]) -> Vec<(ObjectGuid, u32)> {
    let mut updates: Vec<_> = effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::ObjectUpdated { guid, partition } => Some((*guid, *partition)),
            _ => None,
        })
        .collect();
    updates.sort();
    updates
}

#[test]
fn test_serial_tick_updates_each_object_on_its_partition() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let objects = one_per_partition();
    for object in &objects {
        spawn(&map, object);
    }

    map.update(TICK_MS);

    let expected: Vec<_> = (1..).zip(&objects).map(|(partition, object)| (object.guid(), partition)).collect();
    assert_eq!(updates_by_partition(&hooks.take_effects()), expected);
    assert_eq!(map.tick_count(), 1);
    assert!(!map.scheduler().is_cycle_in_progress());
    for object in &objects {
        assert!(map.is_cell_marked(object.cell_id()));
        assert_eq!(object.current_update_partition(), 0);
    }
}

#[test]
fn test_unpartitioned_map_runs_one_global_worker() {
    let hooks = RecordingHooks::new();
    let config = PartitionConfig { enabled: false, ..partition_config(4) };
    let map = serial_map(config, hooks.clone());
    let objects = one_per_partition();
    for object in &objects {
        spawn(&map, object);
    }
    let hero = player(1, P2);
    spawn(&map, &hero);

    map.update(TICK_MS);

    let effects = hooks.take_effects();
    let updates = updates_by_partition(&effects);
    assert_eq!(updates.len(), objects.len());
    assert!(updates.iter().all(|(_, partition)| *partition == 0));
    assert!(effects.contains(&Effect::PlayerUpdated { guid: hero.guid(), partition: 0 }));
}

#[test]
fn test_pooled_tick_matches_registry() {
    let hooks = RecordingHooks::new();
    let map = pooled_map(partition_config(4), hooks.clone(), 2);
    let objects = one_per_partition();
    for object in &objects {
        spawn(&map, object);
    }

    for _ in 0..5 {
        map.update(TICK_MS);
    }

    let updates = updates_by_partition(&hooks.take_effects());
    assert_eq!(updates.len(), objects.len() * 5);
    for (guid, partition) in updates {
        assert_eq!(map.registry().partition_of(guid), Some(partition));
    }
    for object in &objects {
        assert_eq!(hooks.update_count(object.guid()), 5);
    }
    assert!(map.scheduler().in_flight_limit() <= 2);
    assert!(map.scheduler().in_flight_limit() >= 1);
    assert!(map.scheduler().object_budget() <= map.config().object_update_budget);
    assert_eq!(map.scheduler().last_summary().partitions, 4);
}

#[test]
fn test_relays_cross_partitions_during_pooled_ticks() {
    let objects = one_per_partition();
    let guids: Vec<ObjectGuid> = objects.iter().map(|object| object.guid()).collect();
    let hooks = RecordingHooks::with_update_callback(move |scope, object| {
        let Some(index) = guids.iter().position(|guid| *guid == object.guid()) else {
            return;
        };
        let Some(target) = scope.map.objects().resolve_in_world(guids[(index + 1) % guids.len()]) else {
            return;
        };
        if let Some(partition_id) = scope.map.try_get_relay_target_partition(scope.ctx, &target) {
            scope.map.queue_partition_combat_relay(partition_id, target.guid(), object.guid(), false);
        }
    });
    let map = pooled_map(partition_config(4), hooks.clone(), 4);
    for object in &objects {
        spawn(&map, object);
    }

    map.update(TICK_MS);
    map.update(TICK_MS);

    let combats: Vec<_> = hooks
        .take_effects()
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Combat { owner, partition, processing_relays, .. } => Some((owner, partition, processing_relays)),
            _ => None,
        })
        .collect();
    assert!(combats.len() >= objects.len());
    for (owner, partition, processing_relays) in combats {
        assert!(processing_relays);
        assert_eq!(map.registry().partition_of(owner), Some(partition));
    }
}

#[test]
fn test_players_bucketed_by_owning_partition() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let west = player(1, P1);
    let east = player(2, P4);
    spawn(&map, &west);
    spawn(&map, &east);
    spawn(&map, &creature(3, P4));

    map.build_player_buckets();
    let bucket = |partition| -> Vec<ObjectGuid> {
        map.players_for_partition(partition).iter().map(|player| player.guid()).collect()
    };
    assert_eq!(bucket(1), vec![west.guid()]);
    assert_eq!(bucket(4), vec![east.guid()]);
    assert!(bucket(2).is_empty());

    let stats = map.assignment().stats(4).expect("stats recorded for every partition");
    assert_eq!((stats.players, stats.creatures), (1, 1));

    map.update(TICK_MS);
    let effects = hooks.take_effects();
    assert!(effects.contains(&Effect::PlayerUpdated { guid: west.guid(), partition: 1 }));
    assert!(effects.contains(&Effect::PlayerUpdated { guid: east.guid(), partition: 4 }));
}

#[test]
fn test_object_that_stops_needing_updates_is_retired() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let object = creature(1, P2);
    spawn(&map, &object);
    hooks.retire(object.guid());

    map.update(TICK_MS);
    assert_eq!(hooks.update_count(object.guid()), 1);
    assert_eq!(map.registry().partition_of(object.guid()), None);
    assert!(object.is_in_world());

    map.update(TICK_MS);
    assert_eq!(hooks.update_count(object.guid()), 1);
}

#[test]
fn test_update_windows_cover_every_object() {
    for carry_over in [true, false] {
        let hooks = RecordingHooks::new();
        let config = PartitionConfig { object_update_budget: 8, carry_over, ..partition_config(4) };
        let map = serial_map(config, hooks.clone());
        let crowd: Vec<_> = (1..=5).map(|counter| creature(counter, P1)).collect();
        for object in &crowd {
            spawn(&map, object);
        }

        for _ in 0..5 {
            map.update(TICK_MS);
        }
        for object in &crowd {
            assert_eq!(hooks.update_count(object.guid()), 2, "carry_over = {}", carry_over);
        }
    }
}

#[test]
fn test_window_is_empty_for_empty_partition() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    map.scheduler().prepare_partition_object_update_budget(4, TICK_MS);
    assert_eq!(map.scheduler().get_partition_object_update_window(3, 0), (0, 0));

    let (start, count) = map.scheduler().get_partition_object_update_window(3, 10);
    assert!(start < 10);
    assert_eq!(count, 10);
}

#[test]
fn test_toggling_partitioning_between_pooled_ticks() {
    let hooks = RecordingHooks::new();
    let map = pooled_map(partition_config(4), hooks.clone(), 2);
    let objects = one_per_partition();
    for object in &objects {
        spawn(&map, object);
    }

    map.update(TICK_MS);
    map.set_partitioned(false);
    map.update(TICK_MS);
    map.set_partitioned(true);
    map.update(TICK_MS);

    for object in &objects {
        assert_eq!(hooks.update_count(object.guid()), 3);
    }
    assert!(!map.scheduler().is_cycle_in_progress());
}
