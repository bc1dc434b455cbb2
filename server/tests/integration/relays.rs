// map_partition_engine/server/tests/integration/relays.rs
#[path = "../common/mod.rs"]
mod common;

use common::*;
use map_partition_core::core::config::{PartitionConfig, RelayOverflowPolicy};
use map_partition_core::core::types::{ObjectGuid, TypeId};
use map_partition_core::world::relays::{AuraAction, AuraRelay, CharmRelay, MotionAction, ProcRelay, RelayKind};
use map_partition_core::PartitionContext;
use std::sync::Arc;

#[test]
fn test_combat_relay_applies_on_owning_partition() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let attacker = creature(1, P1);
    let victim = creature(2, P2);
    spawn(&map, &attacker);
    spawn(&map, &victim);

    let worker = PartitionContext::new(1);
    let target = map.try_get_relay_target_partition(&worker, &victim).expect("victim owned elsewhere");
    assert_eq!(target, 2);
    assert!(map.queue_partition_combat_relay(target, victim.guid(), attacker.guid(), true));
    assert!(map.has_partition_relay_work_pending(2));

    // Draining the wrong partition does nothing.
    assert_eq!(map.process_partition_relays(1).applied, 0);

    let stats = map.process_partition_relays(2);
    assert_eq!(stats.applied, 1);
    assert!(!map.has_partition_relay_work_pending(2));
    assert_eq!(
        hooks.take_effects(),
        vec![Effect::Combat { owner: victim.guid(), victim: attacker.guid(), partition: 2, processing_relays: true }]
    );

    // A second drain has nothing left to apply.
    assert_eq!(map.process_partition_relays(2).applied, 0);
    assert!(hooks.take_effects().is_empty());
}

#[test]
fn test_relay_target_partition_rules() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let local = creature(1, P1);
    let remote = creature(2, P3);
    let absent = creature(3, P3);
    spawn(&map, &local);
    spawn(&map, &remote);

    let global = PartitionContext::global();
    assert_eq!(map.try_get_relay_target_partition(&global, &remote), None);

    let worker = PartitionContext::new(1);
    assert_eq!(map.try_get_relay_target_partition(&worker, &local), None);
    assert_eq!(map.try_get_relay_target_partition(&worker, &remote), Some(3));
    assert_eq!(map.try_get_relay_target_partition(&worker, &absent), None);

    // An object currently being updated by this worker is applied directly.
    remote.set_current_update_partition(1);
    assert_eq!(map.try_get_relay_target_partition(&worker, &remote), None);
    remote.set_current_update_partition(0);

    {
        let _processing = worker.begin_relay_processing();
        assert_eq!(map.try_get_relay_target_partition(&worker, &remote), None);
    }
    assert_eq!(map.try_get_relay_target_partition(&worker, &remote), Some(3));

    map.set_partitioned(false);
    assert_eq!(map.try_get_relay_target_partition(&worker, &remote), None);
}

#[test]
fn test_relays_rejected_when_unpartitioned_or_global() {
    let config = PartitionConfig { enabled: false, ..partition_config(4) };
    let map = serial_map(config, RecordingHooks::new());
    let a = ObjectGuid::new(TypeId::Unit, 1);
    let b = ObjectGuid::new(TypeId::Unit, 2);

    assert!(!map.queue_partition_threat_relay(2, a, b, 5.0, 1, 0));
    assert_eq!(map.process_partition_relays(2).applied, 0);

    map.set_partitioned(true);
    assert!(!map.queue_partition_combat_relay(0, a, b, false));
    assert!(!map.has_partition_relay_work_pending(0));
    assert!(!map.queue_partition_combat_relay(9, a, b, false));
    assert!(map.queue_partition_combat_relay(4, a, b, false));
}

#[test]
fn test_relays_apply_in_enqueue_order() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let owner = creature(1, P2);
    spawn(&map, &owner);
    let victims: Vec<_> = (10..15).map(|counter| creature(counter, P1)).collect();
    for victim in &victims {
        spawn(&map, victim);
        assert!(map.queue_partition_threat_relay(2, owner.guid(), victim.guid(), 1.0, 1, 0));
    }

    assert!(map.queue_partition_evade_relay(2, owner.guid(), 0));
    assert_eq!(map.relay_queue_depth(RelayKind::Threat, 2), victims.len());
    assert_eq!(map.relay_backlog(2), victims.len() + 1);
    assert_eq!(map.process_partition_relays(2).applied, victims.len() + 1);
    assert_eq!(map.relay_backlog(2), 0);

    let order: Vec<ObjectGuid> = hooks
        .take_effects()
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Threat { victim, .. } => Some(victim),
            _ => None,
        })
        .collect();
    let expected: Vec<ObjectGuid> = victims.iter().map(|victim| victim.guid()).collect();
    assert_eq!(order, expected);
    assert_eq!(map.relay_queue_depth(RelayKind::Threat, 2), 0);
}

#[test]
fn test_minion_relay_bounces_to_owner_partition() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(8), hooks.clone());
    let owner = creature(1, P1);
    let minion = creature(2, P1);
    minion.set_minion(true);
    spawn(&map, &owner);
    spawn(&map, &minion);

    map.assignment().set_partition_override(owner.guid(), 5, 60_000);
    assert!(map.queue_partition_minion_relay(3, owner.guid(), minion.guid(), true));

    let first = map.process_partition_relays(3);
    assert_eq!((first.applied, first.bounced), (0, 1));
    assert!(map.has_partition_relay_work_pending(5));
    assert_eq!(map.relay_queue_depth(RelayKind::Minion, 5), 1);

    let second = map.process_partition_relays(5);
    assert_eq!((second.applied, second.bounced), (1, 0));
    assert_eq!(
        hooks.take_effects(),
        vec![Effect::Minion { owner: owner.guid(), minion: minion.guid(), apply: true, partition: 5 }]
    );
}

#[test]
fn test_minion_relay_requires_minion() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let owner = creature(1, P2);
    let pet = creature(2, P2);
    spawn(&map, &owner);
    spawn(&map, &pet);

    assert!(map.queue_partition_minion_relay(2, owner.guid(), pet.guid(), true));
    let stats = map.process_partition_relays(2);
    assert_eq!((stats.applied, stats.dropped), (0, 1));
    assert!(hooks.take_effects().is_empty());
}

#[test]
fn test_evade_relay_dropped_after_bounce_limit() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let creature = creature(1, P1);
    spawn(&map, &creature);
    let guid = creature.guid();

    assert!(map.queue_partition_evade_relay(1, guid, 0));

    // The owner keeps moving away from whichever partition drains next.
    let drains = [(1, 2), (2, 1), (1, 2)];
    for (drained, owner) in drains {
        map.assignment().set_partition_override(guid, owner, 60_000);
        let stats = map.process_partition_relays(drained);
        assert_eq!((stats.applied, stats.bounced, stats.dropped), (0, 1, 0));
        assert_eq!(map.relay_queue_depth(RelayKind::Evade, owner), 1);
    }

    map.assignment().set_partition_override(guid, 1, 60_000);
    let last = map.process_partition_relays(2);
    assert_eq!((last.applied, last.bounced, last.dropped), (0, 0, 1));
    assert_eq!(map.relay_queue_depth(RelayKind::Evade, 1), 0);
    assert_eq!(map.relay_queue_depth(RelayKind::Evade, 2), 0);
    assert!(hooks.take_effects().is_empty());
}

#[test]
fn test_evade_requires_enabled_ai() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let creature = creature(1, P4);
    spawn(&map, &creature);

    creature.set_ai_enabled(false);
    assert!(map.queue_partition_evade_relay(4, creature.guid(), 1));
    assert_eq!(map.process_partition_relays(4).dropped, 1);

    creature.set_ai_enabled(true);
    assert!(map.queue_partition_evade_relay(4, creature.guid(), 1));
    assert_eq!(map.process_partition_relays(4).applied, 1);
    assert_eq!(hooks.take_effects(), vec![Effect::Evade { creature: creature.guid(), partition: 4 }]);
}

#[test]
fn test_relay_with_despawned_participant_is_dropped() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let owner = creature(1, P2);
    let victim = creature(2, P1);
    spawn(&map, &owner);
    spawn(&map, &victim);

    assert!(map.queue_partition_combat_relay(2, owner.guid(), victim.guid(), false));
    assert!(map.remove_from_map(&PartitionContext::global(), victim.guid()).is_some());

    let stats = map.process_partition_relays(2);
    assert_eq!((stats.applied, stats.dropped), (0, 1));
    assert!(hooks.take_effects().is_empty());
}

#[test]
fn test_proc_relay_without_flag_is_ignored() {
    let map = serial_map(partition_config(4), RecordingHooks::new());
    let relay = ProcRelay {
        actor: ObjectGuid::new(TypeId::Unit, 1),
        target: ObjectGuid::new(TypeId::Unit, 2),
        proc_flag: 0,
        proc_extra: 0,
        amount: 10,
        attack_type: 0,
        proc_spell_id: None,
        proc_aura_id: None,
        proc_aura_effect_index: None,
        proc_phase: 0,
        is_victim: false,
    };

    assert!(!map.queue_partition_proc_relay(3, relay.clone()));
    assert!(!map.has_partition_relay_work_pending(3));
    assert!(map.queue_partition_proc_relay(3, ProcRelay { proc_flag: 4, ..relay }));
    assert_eq!(map.relay_queue_depth(RelayKind::Proc, 3), 1);
}

#[test]
fn test_full_queue_rejects_relay() {
    let config = PartitionConfig {
        relay_queue_limit: 2,
        relay_overflow_policy: RelayOverflowPolicy::Drop,
        ..partition_config(4)
    };
    let map = serial_map(config, RecordingHooks::new());
    let a = ObjectGuid::new(TypeId::Unit, 1);
    let b = ObjectGuid::new(TypeId::Unit, 2);

    assert!(map.queue_partition_attack_relay(1, a, b, true));
    assert!(map.queue_partition_attack_relay(1, a, b, true));
    assert!(!map.queue_partition_attack_relay(1, a, b, true));
    assert_eq!(map.relay_queue_depth(RelayKind::Attack, 1), 2);
}

#[test]
fn test_aura_relay_skipped_when_already_present() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let caster = creature(1, P1);
    let target = creature(2, P3);
    spawn(&map, &caster);
    spawn(&map, &target);
    let relay = AuraRelay {
        caster: caster.guid(),
        target: target.guid(),
        spell_id: 1459,
        eff_mask: 0x7,
        action: AuraAction::Apply,
    };

    assert!(map.queue_partition_aura_relay(3, relay.clone()));
    assert!(map.queue_partition_aura_relay(3, relay));
    let stats = map.process_partition_relays(3);
    assert_eq!((stats.applied, stats.dropped), (1, 1));
    assert_eq!(
        hooks.take_effects(),
        vec![Effect::AuraApplied { caster: caster.guid(), target: target.guid(), spell_id: 1459 }]
    );
}

#[test]
fn test_charm_relay_requires_linked_aura() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let charmer = creature(1, P1);
    let target = creature(2, P2);
    spawn(&map, &charmer);
    spawn(&map, &target);
    let relay = CharmRelay {
        charmer: charmer.guid(),
        target: target.guid(),
        charm_type: 1,
        aura_spell_id: Some(605),
        apply: true,
    };

    assert!(map.queue_partition_charm_relay(2, relay.clone()));
    assert_eq!(map.process_partition_relays(2).dropped, 1);
    assert!(hooks.take_effects().is_empty());

    hooks.grant_aura(target.guid(), 605, charmer.guid());
    assert!(map.queue_partition_charm_relay(2, relay));
    assert_eq!(map.process_partition_relays(2).applied, 1);
    assert_eq!(hooks.take_effects(), vec![Effect::Charmed { charmer: charmer.guid(), target: target.guid() }]);
}

#[test]
fn test_motion_relay_preconditions() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let mover = creature(1, P4);
    let enemy = creature(2, P1);
    spawn(&map, &mover);
    spawn(&map, &enemy);
    let gone = ObjectGuid::new(TypeId::Unit, 99);

    assert!(map.queue_partition_motion_relay(4, mover.guid(), MotionAction::Flee { enemy: gone, time_ms: 3000 }));
    assert!(map.queue_partition_motion_relay(4, mover.guid(), MotionAction::SplinePath { path: Vec::new(), forced_movement: 0 }));
    assert!(map.queue_partition_motion_relay(
        4,
        mover.guid(),
        MotionAction::VehicleTeleportPlayer { destination: enemy.position() }
    ));
    assert!(map.queue_partition_motion_relay(4, mover.guid(), MotionAction::Flee { enemy: enemy.guid(), time_ms: 3000 }));
    let stats = map.process_partition_relays(4);
    assert_eq!((stats.applied, stats.dropped), (1, 3));
    assert_eq!(
        hooks.take_effects(),
        vec![Effect::Motion { mover: mover.guid(), action: "flee", target: Some(enemy.guid()) }]
    );

    mover.set_has_motion_master(false);
    assert!(map.queue_partition_motion_relay(4, mover.guid(), MotionAction::Stop));
    assert_eq!(map.process_partition_relays(4).dropped, 1);
}

#[test]
fn test_relay_processing_flag_visible_to_hooks() {
    let hooks = RecordingHooks::new();
    let map = serial_map(partition_config(4), hooks.clone());
    let owner = creature(1, P3);
    let victim = creature(2, P2);
    spawn(&map, &owner);
    spawn(&map, &victim);

    assert!(map.queue_partition_combat_relay(3, owner.guid(), victim.guid(), false));
    map.process_partition_relays(3);

    let effects = hooks.take_effects();
    assert!(matches!(effects.as_slice(), [Effect::Combat { processing_relays: true, partition: 3, .. }]));
}

#[test]
fn test_concurrent_producers_apply_each_relay_once() {
    let hooks = RecordingHooks::new();
    let map = serial_map(PartitionConfig { relay_queue_limit: 100_000, ..partition_config(4) }, hooks.clone());
    let owner = creature(1, P2);
    let victim = creature(2, P1);
    spawn(&map, &owner);
    spawn(&map, &victim);

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let map = Arc::clone(&map);
            let (owner, victim) = (owner.guid(), victim.guid());
            std::thread::spawn(move || {
                for _ in 0..250 {
                    assert!(map.queue_partition_threat_relay(2, owner, victim, 1.0, 1, 0));
                }
            })
        })
        .collect();

    let mut applied = 0;
    while producers.iter().any(|producer| !producer.is_finished()) {
        applied += map.process_partition_relays(2).applied;
    }
    for producer in producers {
        producer.join().expect("producer panicked");
    }
    applied += map.process_partition_relays(2).applied;

    assert_eq!(applied, 1000);
    assert_eq!(hooks.take_effects().len(), 1000);
}
