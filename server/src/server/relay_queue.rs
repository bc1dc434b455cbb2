// map_partition_engine/server/src/server/relay_queue.rs
use super::map::PartitionedMap;
use crate::concurrent::relay_channel::PartitionRelayChannel;
use crate::core::config::RelayOverflowPolicy;
use crate::core::types::{game_time_ms, ObjectGuid, PartitionId, GLOBAL_PARTITION};
use crate::operational::monitoring::metrics::record_relay_dropped;
use crate::world::relays::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Every relay channel of a map plus the per-partition "work pending" flags.
pub struct RelayQueueSet {
    pub(crate) threat: PartitionRelayChannel<Queued<ThreatRelay>>,
    pub(crate) threat_action: PartitionRelayChannel<Queued<ThreatActionRelay>>,
    pub(crate) proc: PartitionRelayChannel<Queued<ProcRelay>>,
    pub(crate) aura: PartitionRelayChannel<Queued<AuraRelay>>,
    pub(crate) path: PartitionRelayChannel<Queued<PathRelay>>,
    pub(crate) point: PartitionRelayChannel<Queued<PointRelay>>,
    pub(crate) motion: PartitionRelayChannel<Queued<MotionRelay>>,
    pub(crate) assist: PartitionRelayChannel<Queued<AssistRelay>>,
    pub(crate) assist_distract: PartitionRelayChannel<Queued<AssistDistractRelay>>,
    pub(crate) threat_target_action: PartitionRelayChannel<Queued<ThreatTargetActionRelay>>,
    pub(crate) combat: PartitionRelayChannel<Queued<CombatRelay>>,
    pub(crate) loot: PartitionRelayChannel<Queued<LootRelay>>,
    pub(crate) dyn_object: PartitionRelayChannel<Queued<DynObjectRelay>>,
    pub(crate) minion: PartitionRelayChannel<Queued<MinionRelay>>,
    pub(crate) charm: PartitionRelayChannel<Queued<CharmRelay>>,
    pub(crate) game_object: PartitionRelayChannel<Queued<GameObjectRelay>>,
    pub(crate) combat_state: PartitionRelayChannel<Queued<CombatStateRelay>>,
    pub(crate) attack: PartitionRelayChannel<Queued<AttackRelay>>,
    pub(crate) evade: PartitionRelayChannel<Queued<EvadeRelay>>,
    pub(crate) taunt: PartitionRelayChannel<Queued<TauntRelay>>,
    work_pending: Box<[AtomicBool]>,
}

impl RelayQueueSet {
    pub fn new(partition_count: u32, limit: usize, policy: RelayOverflowPolicy) -> Self {
        macro_rules! channel {
            ($kind:expr) => {
                PartitionRelayChannel::new($kind.as_str(), partition_count, limit, policy)
            };
        }
        RelayQueueSet {
            threat: channel!(RelayKind::Threat),
            threat_action: channel!(RelayKind::ThreatAction),
            proc: channel!(RelayKind::Proc),
            aura: channel!(RelayKind::Aura),
            path: channel!(RelayKind::Path),
            point: channel!(RelayKind::Point),
            motion: channel!(RelayKind::Motion),
            assist: channel!(RelayKind::Assist),
            assist_distract: channel!(RelayKind::AssistDistract),
            threat_target_action: channel!(RelayKind::ThreatTargetAction),
            combat: channel!(RelayKind::Combat),
            loot: channel!(RelayKind::Loot),
            dyn_object: channel!(RelayKind::DynObject),
            minion: channel!(RelayKind::Minion),
            charm: channel!(RelayKind::Charm),
            game_object: channel!(RelayKind::GameObject),
            combat_state: channel!(RelayKind::CombatState),
            attack: channel!(RelayKind::Attack),
            evade: channel!(RelayKind::Evade),
            taunt: channel!(RelayKind::Taunt),
            work_pending: (0..=partition_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn mark_work_pending(&self, partition_id: PartitionId) {
        if let Some(flag) = self.work_pending.get(partition_id as usize) {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn has_work_pending(&self, partition_id: PartitionId) -> bool {
        self.work_pending
            .get(partition_id as usize)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Clears and returns the flag. Cleared before draining so relays that
    /// arrive mid-drain set it again for the next cycle.
    pub fn take_work_pending(&self, partition_id: PartitionId) -> bool {
        self.work_pending
            .get(partition_id as usize)
            .is_some_and(|flag| flag.swap(false, Ordering::AcqRel))
    }

    pub fn depth(&self, kind: RelayKind, partition_id: PartitionId) -> usize {
        match kind {
            RelayKind::Threat => self.threat.len(partition_id),
            RelayKind::ThreatAction => self.threat_action.len(partition_id),
            RelayKind::Proc => self.proc.len(partition_id),
            RelayKind::Aura => self.aura.len(partition_id),
            RelayKind::Path => self.path.len(partition_id),
            RelayKind::Point => self.point.len(partition_id),
            RelayKind::Motion => self.motion.len(partition_id),
            RelayKind::Assist => self.assist.len(partition_id),
            RelayKind::AssistDistract => self.assist_distract.len(partition_id),
            RelayKind::ThreatTargetAction => self.threat_target_action.len(partition_id),
            RelayKind::Combat => self.combat.len(partition_id),
            RelayKind::Loot => self.loot.len(partition_id),
            RelayKind::DynObject => self.dyn_object.len(partition_id),
            RelayKind::Minion => self.minion.len(partition_id),
            RelayKind::Charm => self.charm.len(partition_id),
            RelayKind::GameObject => self.game_object.len(partition_id),
            RelayKind::CombatState => self.combat_state.len(partition_id),
            RelayKind::Attack => self.attack.len(partition_id),
            RelayKind::Evade => self.evade.len(partition_id),
            RelayKind::Taunt => self.taunt.len(partition_id),
        }
    }

    pub fn total_depth(&self, partition_id: PartitionId) -> usize {
        RelayKind::DRAIN_ORDER.iter().map(|kind| self.depth(*kind, partition_id)).sum()
    }
}

impl PartitionedMap {
    /// Queues `relay` for `partition_id`. Returns false when the caller
    /// should apply the effect directly: partitioning is off, the target is
    /// global, or the queue rejected it.
    pub(crate) fn enqueue_relay<T>(
        &self,
        kind: RelayKind,
        channel: &PartitionRelayChannel<Queued<T>>,
        partition_id: PartitionId,
        relay: T,
    ) -> bool {
        if !self.is_partitioned() || partition_id == GLOBAL_PARTITION {
            return false;
        }
        self.push_queued(kind, channel, partition_id, Queued::new(relay, game_time_ms()))
    }

    pub(crate) fn push_queued<T>(
        &self,
        kind: RelayKind,
        channel: &PartitionRelayChannel<Queued<T>>,
        partition_id: PartitionId,
        queued: Queued<T>,
    ) -> bool {
        match channel.push(partition_id, queued) {
            Ok(_) => {
                self.relays.mark_work_pending(partition_id);
                true
            }
            Err(e) => {
                warn!(map = self.map_id(), partition = partition_id, kind = kind.as_str(), error = %e, "Dropping partition relay");
                record_relay_dropped(self.map_id(), kind.as_str(), "queue_rejected");
                false
            }
        }
    }

    pub fn has_partition_relay_work_pending(&self, partition_id: PartitionId) -> bool {
        self.relays.has_work_pending(partition_id)
    }

    pub fn relay_queue_depth(&self, kind: RelayKind, partition_id: PartitionId) -> usize {
        self.relays.depth(kind, partition_id)
    }

    /// Relays of every kind waiting for `partition_id`.
    pub fn relay_backlog(&self, partition_id: PartitionId) -> usize {
        self.relays.total_depth(partition_id)
    }

    pub fn queue_partition_threat_relay(
        &self,
        partition_id: PartitionId,
        owner: ObjectGuid,
        victim: ObjectGuid,
        threat: f32,
        school_mask: u32,
        spell_id: u32,
    ) -> bool {
        let relay = ThreatRelay { owner, victim, threat, school_mask, spell_id };
        self.enqueue_relay(RelayKind::Threat, &self.relays.threat, partition_id, relay)
    }

    pub fn queue_partition_threat_clear_all(&self, partition_id: PartitionId, owner: ObjectGuid) -> bool {
        let relay = ThreatActionRelay { owner, action: ThreatAction::ClearAll };
        self.enqueue_relay(RelayKind::ThreatAction, &self.relays.threat_action, partition_id, relay)
    }

    pub fn queue_partition_threat_reset_all(&self, partition_id: PartitionId, owner: ObjectGuid) -> bool {
        let relay = ThreatActionRelay { owner, action: ThreatAction::ResetAll };
        self.enqueue_relay(RelayKind::ThreatAction, &self.relays.threat_action, partition_id, relay)
    }

    pub fn queue_partition_threat_target_clear(&self, partition_id: PartitionId, owner: ObjectGuid, target: ObjectGuid) -> bool {
        let relay = ThreatTargetActionRelay { owner, target, action: ThreatTargetAction::Clear };
        self.enqueue_relay(RelayKind::ThreatTargetAction, &self.relays.threat_target_action, partition_id, relay)
    }

    pub fn queue_partition_threat_target_reset(&self, partition_id: PartitionId, owner: ObjectGuid, target: ObjectGuid) -> bool {
        let relay = ThreatTargetActionRelay { owner, target, action: ThreatTargetAction::Reset };
        self.enqueue_relay(RelayKind::ThreatTargetAction, &self.relays.threat_target_action, partition_id, relay)
    }

    pub fn queue_partition_taunt_apply(&self, partition_id: PartitionId, owner: ObjectGuid, taunter: ObjectGuid) -> bool {
        let relay = TauntRelay { owner, taunter, action: TauntAction::Apply };
        self.enqueue_relay(RelayKind::Taunt, &self.relays.taunt, partition_id, relay)
    }

    pub fn queue_partition_taunt_fade(&self, partition_id: PartitionId, owner: ObjectGuid, taunter: ObjectGuid) -> bool {
        let relay = TauntRelay { owner, taunter, action: TauntAction::Fade };
        self.enqueue_relay(RelayKind::Taunt, &self.relays.taunt, partition_id, relay)
    }

    pub fn queue_partition_combat_relay(
        &self,
        partition_id: PartitionId,
        owner: ObjectGuid,
        victim: ObjectGuid,
        initial_aggro: bool,
    ) -> bool {
        let relay = CombatRelay { owner, victim, initial_aggro };
        self.enqueue_relay(RelayKind::Combat, &self.relays.combat, partition_id, relay)
    }

    pub fn queue_partition_loot_relay(
        &self,
        partition_id: PartitionId,
        creature: ObjectGuid,
        recipient: Option<ObjectGuid>,
        with_group: bool,
    ) -> bool {
        let relay = LootRelay { creature, recipient, with_group };
        self.enqueue_relay(RelayKind::Loot, &self.relays.loot, partition_id, relay)
    }

    pub fn queue_partition_dyn_object_relay(&self, partition_id: PartitionId, dyn_object: ObjectGuid) -> bool {
        self.enqueue_relay(RelayKind::DynObject, &self.relays.dyn_object, partition_id, DynObjectRelay { dyn_object })
    }

    pub fn queue_partition_minion_relay(
        &self,
        partition_id: PartitionId,
        owner: ObjectGuid,
        minion: ObjectGuid,
        apply: bool,
    ) -> bool {
        let relay = MinionRelay { owner, minion, apply };
        self.enqueue_relay(RelayKind::Minion, &self.relays.minion, partition_id, relay)
    }

    pub fn queue_partition_charm_relay(&self, partition_id: PartitionId, relay: CharmRelay) -> bool {
        self.enqueue_relay(RelayKind::Charm, &self.relays.charm, partition_id, relay)
    }

    pub fn queue_partition_game_object_relay(
        &self,
        partition_id: PartitionId,
        owner: ObjectGuid,
        action: GameObjectAction,
    ) -> bool {
        let relay = GameObjectRelay { owner, action };
        self.enqueue_relay(RelayKind::GameObject, &self.relays.game_object, partition_id, relay)
    }

    pub fn queue_partition_combat_state_relay(
        &self,
        partition_id: PartitionId,
        unit: ObjectGuid,
        enemy: Option<ObjectGuid>,
        pvp: bool,
        duration_ms: u32,
    ) -> bool {
        let relay = CombatStateRelay { unit, enemy, pvp, duration_ms };
        self.enqueue_relay(RelayKind::CombatState, &self.relays.combat_state, partition_id, relay)
    }

    pub fn queue_partition_attack_relay(
        &self,
        partition_id: PartitionId,
        attacker: ObjectGuid,
        victim: ObjectGuid,
        melee: bool,
    ) -> bool {
        let relay = AttackRelay { attacker, victim, melee };
        self.enqueue_relay(RelayKind::Attack, &self.relays.attack, partition_id, relay)
    }

    pub fn queue_partition_evade_relay(&self, partition_id: PartitionId, creature: ObjectGuid, reason: u8) -> bool {
        self.enqueue_relay(RelayKind::Evade, &self.relays.evade, partition_id, EvadeRelay { creature, reason })
    }

    /// Proc relays without a proc flag carry nothing to apply and are ignored.
    pub fn queue_partition_proc_relay(&self, partition_id: PartitionId, relay: ProcRelay) -> bool {
        if relay.proc_flag == 0 {
            return false;
        }
        self.enqueue_relay(RelayKind::Proc, &self.relays.proc, partition_id, relay)
    }

    pub fn queue_partition_aura_relay(&self, partition_id: PartitionId, relay: AuraRelay) -> bool {
        self.enqueue_relay(RelayKind::Aura, &self.relays.aura, partition_id, relay)
    }

    pub fn queue_partition_motion_relay(&self, partition_id: PartitionId, mover: ObjectGuid, action: MotionAction) -> bool {
        self.enqueue_relay(RelayKind::Motion, &self.relays.motion, partition_id, MotionRelay { mover, action })
    }

    pub fn queue_partition_path_relay(&self, partition_id: PartitionId, mover: ObjectGuid, target: ObjectGuid) -> bool {
        self.enqueue_relay(RelayKind::Path, &self.relays.path, partition_id, PathRelay { mover, target })
    }

    pub fn queue_partition_point_relay(&self, partition_id: PartitionId, relay: PointRelay) -> bool {
        self.enqueue_relay(RelayKind::Point, &self.relays.point, partition_id, relay)
    }

    pub fn queue_partition_assist_relay(&self, partition_id: PartitionId, mover: ObjectGuid, x: f32, y: f32, z: f32) -> bool {
        self.enqueue_relay(RelayKind::Assist, &self.relays.assist, partition_id, AssistRelay { mover, x, y, z })
    }

    pub fn queue_partition_assist_distract_relay(&self, partition_id: PartitionId, mover: ObjectGuid, time_ms: u32) -> bool {
        let relay = AssistDistractRelay { mover, time_ms };
        self.enqueue_relay(RelayKind::AssistDistract, &self.relays.assist_distract, partition_id, relay)
    }
}
