// map_partition_engine/server/tests/integration/registry.rs
#[path = "../common/mod.rs"]
mod common;

use common::*;
use map_partition_core::core::config::PartitionConfig;
use map_partition_core::core::types::{ObjectGuid, Position, TypeId};
use map_partition_core::world::objects::WorldObject;
use map_partition_core::PartitionContext;
use std::sync::Arc;

#[test]
fn test_add_registers_on_owning_partition_once() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P2);
    spawn(&map, &object);

    assert_eq!(map.registry().partition_of(object.guid()), Some(2));
    assert!(!map.add_to_partitioned_update_list(&object));
    assert_eq!(map.registry().total_len(), 1);
    assert_eq!(map.partitioned_object_count(2), 1);
    assert!(map.find_partitioned_object(object.guid()).is_some());
    assert!(map.registry().read().is_consistent());
}

#[test]
fn test_players_are_never_registered() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let hero = player(1, P3);
    spawn(&map, &hero);

    assert!(hero.is_in_world());
    assert_eq!(map.registry().partition_of(hero.guid()), None);
    assert_eq!(map.registry().total_len(), 0);
    assert_eq!(map.objects().players_in_world().len(), 1);
}

#[test]
fn test_removal_inside_worker_is_queued() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P2);
    let other = creature(2, P2);
    spawn(&map, &object);
    spawn(&map, &other);

    let worker = PartitionContext::new(2);
    map.remove_from_partitioned_update_list(&worker, &object);
    map.remove_from_partitioned_update_list(&worker, &object);
    assert_eq!(map.registry().partition_of(object.guid()), Some(2));
    assert_eq!(map.registry().pending_counts(), (0, 2, 0));

    assert_eq!(map.apply_queued_partitioned_removals(), 1);
    assert_eq!(map.registry().partition_of(object.guid()), None);
    assert!(map.find_partitioned_object(object.guid()).is_none());
    assert_eq!(map.registry().partition_of(other.guid()), Some(2));
    assert_eq!(map.apply_queued_partitioned_removals(), 0);
    assert!(map.registry().read().is_consistent());
}

#[test]
fn test_removal_without_lock_for_guard_holders() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P1);
    spawn(&map, &object);

    {
        let mut lists = map.registry().write();
        assert!(map.remove_from_partitioned_update_list_no_lock(&mut lists, object.guid()));
        assert!(!map.remove_from_partitioned_update_list_no_lock(&mut lists, object.guid()));
    }
    assert_eq!(map.registry().total_len(), 0);
    assert!(map.find_partitioned_object(object.guid()).is_none());
}

#[test]
fn test_remove_from_map_unregisters() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P4);
    spawn(&map, &object);

    let removed = map.remove_from_map(&PartitionContext::global(), object.guid()).expect("object was on the map");
    assert!(!removed.is_in_world());
    assert_eq!(map.registry().partition_of(object.guid()), None);
    assert!(map.objects().resolve(object.guid()).is_none());
    assert!(map.remove_from_map(&PartitionContext::global(), object.guid()).is_none());
}

#[test]
fn test_ownership_change_inside_worker_applies_after_cycle() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P1);
    spawn(&map, &object);

    let worker = PartitionContext::new(1);
    map.relocate_object(&worker, &object, Position::xy(P4.0, P4.1));
    assert_eq!(map.registry().partition_of(object.guid()), Some(1));

    assert_eq!(map.apply_queued_partitioned_ownership_updates(), 1);
    assert_eq!(map.registry().partition_of(object.guid()), Some(4));
    assert_eq!(map.partitioned_object_count(4), 1);
    assert_eq!(map.partitioned_object_count(1), 0);

    // Already on its owner: nothing to do.
    assert!(!map.update_partitioned_ownership(&worker, &object));
    assert_eq!(map.apply_queued_partitioned_ownership_updates(), 0);
}

#[test]
fn test_ownership_change_outside_worker_is_immediate() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P1);
    spawn(&map, &object);

    map.relocate_object(&PartitionContext::global(), &object, Position::xy(P3.0, P3.1));
    assert_eq!(map.registry().partition_of(object.guid()), Some(3));
    assert_eq!(map.registry().len(1), 0);
}

#[test]
fn test_queued_ownership_skips_departed_objects() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let object = creature(1, P1);
    spawn(&map, &object);

    let worker = PartitionContext::new(1);
    map.relocate_object(&worker, &object, Position::xy(P2.0, P2.1));
    map.remove_from_map(&PartitionContext::global(), object.guid());

    assert_eq!(map.apply_queued_partitioned_ownership_updates(), 0);
    assert_eq!(map.registry().partition_of(object.guid()), None);
}

#[test]
fn test_add_inside_worker_waits_for_flush() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let summoned = creature(7, P3);

    map.add_to_map(&PartitionContext::new(1), summoned.clone());
    assert!(summoned.is_in_world());
    assert_eq!(map.registry().partition_of(summoned.guid()), None);

    assert_eq!(map.flush_pending_adds(), 1);
    assert_eq!(map.registry().partition_of(summoned.guid()), Some(3));
    assert_eq!(map.flush_pending_adds(), 0);
}

#[test]
fn test_collect_skips_objects_out_of_world() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let present = creature(1, P2);
    let leaving = creature(2, P2);
    spawn(&map, &present);
    spawn(&map, &leaving);

    leaving.set_in_world(false);
    let collected = map.collect_partitioned_updatable_objects(2);
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].guid(), present.guid());
    assert_eq!(map.registry().len(2), 2);
}

#[test]
fn test_toggling_partitioning_rebuilds_assignments() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let objects = [creature(1, P1), creature(2, P2), creature(3, P3), creature(4, P4)];
    for object in &objects {
        spawn(&map, object);
    }

    map.set_partitioned(false);
    assert!(!map.is_partitioned());
    assert_eq!(map.registry().len(0), objects.len());
    for object in &objects {
        assert_eq!(map.registry().partition_of(object.guid()), Some(0));
    }

    map.set_partitioned(true);
    for (expected, object) in (1..).zip(&objects) {
        assert_eq!(map.registry().partition_of(object.guid()), Some(expected));
    }
    assert!(map.registry().read().is_consistent());
}

#[test]
fn test_unpartitioned_map_registers_globally() {
    let config = PartitionConfig { enabled: false, ..partition_config(4) };
    let map = serial_map(config, RecordingHooks::new());
    let object = creature(1, P4);
    spawn(&map, &object);

    assert_eq!(map.partition_id_for_unit(&object), 0);
    assert_eq!(map.registry().partition_of(object.guid()), Some(0));
    assert!(!map.update_partitioned_ownership(&PartitionContext::global(), &object));
}

#[test]
fn test_spawn_ids_follow_map_membership() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let first = Arc::new(WorldObject::new(ObjectGuid::new(TypeId::Unit, 1), Position::xy(P1.0, P1.1)).with_spawn_id(300));
    let second = Arc::new(WorldObject::new(ObjectGuid::new(TypeId::Unit, 2), Position::xy(P2.0, P2.1)).with_spawn_id(300));
    spawn(&map, &first);
    spawn(&map, &second);
    assert_eq!(map.objects().guids_for_spawn_id(300).len(), 2);

    map.remove_from_map(&PartitionContext::global(), first.guid());
    assert_eq!(map.objects().guids_for_spawn_id(300).as_slice(), &[second.guid()]);
    map.remove_from_map(&PartitionContext::global(), second.guid());
    assert!(map.objects().guids_for_spawn_id(300).is_empty());
}
