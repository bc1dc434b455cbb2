// map_partition_engine/server/src/server/relay_processor.rs
use super::context::{PartitionContext, WorkerScope};
use super::map::PartitionedMap;
use crate::concurrent::relay_channel::PartitionRelayChannel;
use crate::core::types::{game_time_ms, ObjectGuid, PartitionId, GLOBAL_PARTITION};
use crate::operational::monitoring::metrics::{record_relay_dropped, record_relay_latency, record_relay_queue_depth};
use crate::world::objects::WorldObject;
use crate::world::relays::{AuraAction, Queued, RelayKind};
use ahash::AHashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

/// What one drain of a partition's relay queues did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayCycleStats {
    pub applied: usize,
    pub bounced: usize,
    pub dropped: usize,
    pub lookup_cache_size: usize,
    pub cycle_ms: u64,
    pub emitted_metrics: bool,
}

enum RelayOutcome {
    Applied,
    /// The keyed participant is owned by another partition.
    Reroute(PartitionId),
    Dropped(&'static str),
}

#[derive(Default)]
struct LatencyAccumulator {
    samples: u64,
    total_ms: u64,
    max_ms: u64,
}

impl LatencyAccumulator {
    fn sample(&mut self, queued_ms: u64) {
        if queued_ms == 0 {
            return;
        }
        let latency = game_time_ms().saturating_sub(queued_ms);
        self.samples += 1;
        self.total_ms += latency;
        self.max_ms = self.max_ms.max(latency);
    }

    fn emit(&self, map: &PartitionedMap, partition_id: PartitionId, kind: RelayKind) {
        if self.samples == 0 {
            return;
        }
        record_relay_latency(map.map_id(), partition_id, kind.as_str(), self.total_ms / self.samples, self.max_ms);
    }
}

/// State of one drain pass: the guid lookup cache lives exactly as long as
/// the pass.
struct RelayCycle<'a> {
    map: &'a PartitionedMap,
    scope: WorkerScope<'a>,
    partition_id: PartitionId,
    cache: AHashMap<ObjectGuid, Option<Arc<WorldObject>>>,
    emit_metrics: bool,
    stats: RelayCycleStats,
}

impl<'a> RelayCycle<'a> {
    /// Resolves `guid` to an in-world object, memoizing the store lookup.
    fn resolve(&mut self, guid: ObjectGuid) -> Option<Arc<WorldObject>> {
        if guid.is_empty() {
            return None;
        }
        let map = self.map;
        self.cache
            .entry(guid)
            .or_insert_with(|| map.objects().resolve(guid))
            .clone()
            .filter(|object| object.is_in_world())
    }

    fn foreign_owner(&self, object: &WorldObject) -> Option<PartitionId> {
        let owner = self.map.partition_id_for_unit(object);
        (owner != GLOBAL_PARTITION && owner != self.partition_id).then_some(owner)
    }

    fn drain_kind<T, F>(&mut self, kind: RelayKind, channel: &'a PartitionRelayChannel<Queued<T>>, mut apply: F)
    where
        F: FnMut(&mut Self, &T) -> RelayOutcome,
    {
        let batch = channel.drain(self.partition_id);
        if self.emit_metrics {
            record_relay_queue_depth(self.map.map_id(), self.partition_id, kind.as_str(), batch.len());
        }
        if batch.is_empty() {
            return;
        }

        let mut latency = LatencyAccumulator::default();
        for queued in batch {
            match apply(self, &queued.relay) {
                RelayOutcome::Applied => {
                    self.stats.applied += 1;
                    latency.sample(queued.queued_ms);
                }
                RelayOutcome::Reroute(owner) => self.bounce(kind, channel, owner, queued),
                RelayOutcome::Dropped(reason) => {
                    self.stats.dropped += 1;
                    trace!(map = self.map.map_id(), partition = self.partition_id, kind = kind.as_str(), reason, "Relay dropped");
                    record_relay_dropped(self.map.map_id(), kind.as_str(), reason);
                }
            }
        }

        if self.emit_metrics {
            latency.emit(self.map, self.partition_id, kind);
        }
    }

    /// Re-queues `queued` on `owner`, or drops it once it has bounced the
    /// configured number of times. Only `owner`'s queue lock is taken.
    fn bounce<T>(&mut self, kind: RelayKind, channel: &PartitionRelayChannel<Queued<T>>, owner: PartitionId, mut queued: Queued<T>) {
        let max_bounces = self.map.config().max_relay_bounces;
        if queued.bounce_count >= max_bounces {
            self.stats.dropped += 1;
            warn!(
                map = self.map.map_id(),
                partition = self.partition_id,
                owner,
                kind = kind.as_str(),
                bounces = queued.bounce_count,
                "Dropping relay after reaching the bounce limit"
            );
            record_relay_dropped(self.map.map_id(), kind.as_str(), "bounce_limit");
            return;
        }

        queued.bounce_count += 1;
        if self.map.push_queued(kind, channel, owner, queued) {
            self.stats.bounced += 1;
        } else {
            self.stats.dropped += 1;
        }
    }
}

macro_rules! resolve_or_drop {
    ($cycle:expr, $guid:expr) => {
        match $cycle.resolve($guid) {
            Some(object) => object,
            None => return RelayOutcome::Dropped("missing_participant"),
        }
    };
}

/// Resolves the participant an ownership-sensitive relay is keyed on and
/// reroutes when another partition owns it.
macro_rules! resolve_keyed {
    ($cycle:expr, $guid:expr) => {{
        let object = resolve_or_drop!($cycle, $guid);
        if let Some(owner) = $cycle.foreign_owner(&object) {
            return RelayOutcome::Reroute(owner);
        }
        object
    }};
}

macro_rules! require_motion_master {
    ($mover:expr) => {
        if !$mover.has_motion_master() {
            return RelayOutcome::Dropped("no_motion_master");
        }
    };
}

impl PartitionedMap {
    /// Drains every relay queue of `partition_id` and applies what it can.
    pub fn process_partition_relays(&self, partition_id: PartitionId) -> RelayCycleStats {
        let ctx = PartitionContext::new(partition_id);
        self.process_partition_relays_in(&ctx)
    }

    pub(crate) fn process_partition_relays_in(&self, ctx: &PartitionContext) -> RelayCycleStats {
        let partition_id = ctx.partition_id();
        if !self.is_partitioned() || partition_id == GLOBAL_PARTITION || partition_id > self.partition_count() {
            return RelayCycleStats::default();
        }

        self.relays.take_work_pending(partition_id);
        let _processing = ctx.begin_relay_processing();
        let started = Instant::now();
        let every_n = self.config().relay_metrics_every_n_ticks.max(1);

        let mut cycle = RelayCycle {
            map: self,
            scope: WorkerScope::new(self, ctx),
            partition_id,
            cache: AHashMap::new(),
            emit_metrics: self.tick_count() % every_n == 0,
            stats: RelayCycleStats::default(),
        };
        let hooks = self.hooks();
        let queues = &self.relays;

        cycle.drain_kind(RelayKind::Threat, &queues.threat, |cycle, relay| {
            let owner = resolve_or_drop!(cycle, relay.owner);
            let victim = resolve_or_drop!(cycle, relay.victim);
            hooks.add_threat(&cycle.scope, &owner, &victim, relay);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::ThreatAction, &queues.threat_action, |cycle, relay| {
            let owner = resolve_or_drop!(cycle, relay.owner);
            hooks.threat_action(&cycle.scope, &owner, relay.action);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Proc, &queues.proc, |cycle, relay| {
            let actor = resolve_or_drop!(cycle, relay.actor);
            let target = resolve_or_drop!(cycle, relay.target);
            hooks.trigger_proc(&cycle.scope, &actor, &target, relay);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Aura, &queues.aura, |cycle, relay| {
            let caster = resolve_or_drop!(cycle, relay.caster);
            let target = resolve_or_drop!(cycle, relay.target);
            match relay.action {
                AuraAction::Apply => {
                    if !hooks.spell_exists(relay.spell_id) {
                        return RelayOutcome::Dropped("unknown_spell");
                    }
                    if hooks.has_aura_from(&target, relay.spell_id, &caster) {
                        return RelayOutcome::Dropped("aura_present");
                    }
                    hooks.add_aura(&cycle.scope, &caster, &target, relay.spell_id, relay.eff_mask);
                }
                AuraAction::Remove { remove_mode } => {
                    hooks.remove_aura(&cycle.scope, &caster, &target, relay.spell_id, relay.eff_mask, remove_mode);
                }
            }
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Path, &queues.path, |cycle, relay| {
            let mover = resolve_keyed!(cycle, relay.mover);
            require_motion_master!(mover);
            let target = resolve_or_drop!(cycle, relay.target);
            hooks.move_chase(&cycle.scope, &mover, &target);
            cycle.map.assignment().record_path_handoff();
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Point, &queues.point, |cycle, relay| {
            let mover = resolve_keyed!(cycle, relay.mover);
            require_motion_master!(mover);
            hooks.move_point(&cycle.scope, &mover, relay);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Motion, &queues.motion, |cycle, relay| {
            let mover = resolve_keyed!(cycle, relay.mover);
            require_motion_master!(mover);
            let action = &relay.action;
            if !action.has_required_path() {
                return RelayOutcome::Dropped("empty_path");
            }
            if action.requires_player_mover() && !mover.is_player() {
                return RelayOutcome::Dropped("mover_not_player");
            }
            let target = match (action.required_target(), action.optional_target()) {
                (Some(guid), _) => Some(resolve_or_drop!(cycle, guid)),
                (None, Some(guid)) => cycle.resolve(guid),
                (None, None) => None,
            };
            hooks.apply_motion(&cycle.scope, &mover, action, target.as_ref());
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Assist, &queues.assist, |cycle, relay| {
            let mover = resolve_keyed!(cycle, relay.mover);
            require_motion_master!(mover);
            hooks.move_seek_assistance(&cycle.scope, &mover, relay.x, relay.y, relay.z);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::AssistDistract, &queues.assist_distract, |cycle, relay| {
            let mover = resolve_keyed!(cycle, relay.mover);
            require_motion_master!(mover);
            hooks.move_seek_assistance_distract(&cycle.scope, &mover, relay.time_ms);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::ThreatTargetAction, &queues.threat_target_action, |cycle, relay| {
            let owner = resolve_or_drop!(cycle, relay.owner);
            let target = resolve_or_drop!(cycle, relay.target);
            hooks.threat_target_action(&cycle.scope, &owner, &target, relay.action);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Combat, &queues.combat, |cycle, relay| {
            let owner = resolve_or_drop!(cycle, relay.owner);
            let victim = resolve_or_drop!(cycle, relay.victim);
            hooks.start_combat(&cycle.scope, &owner, &victim, relay.initial_aggro);
            cycle.map.assignment().record_combat_handoff();
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Loot, &queues.loot, |cycle, relay| {
            let creature = resolve_or_drop!(cycle, relay.creature);
            let recipient = relay.recipient.and_then(|guid| cycle.resolve(guid));
            hooks.set_loot_recipient(&cycle.scope, &creature, recipient.as_ref(), relay.with_group);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::DynObject, &queues.dyn_object, |cycle, relay| {
            let dyn_object = resolve_or_drop!(cycle, relay.dyn_object);
            hooks.remove_dynamic_object(&cycle.scope, &dyn_object);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Minion, &queues.minion, |cycle, relay| {
            let owner = resolve_keyed!(cycle, relay.owner);
            let minion = resolve_or_drop!(cycle, relay.minion);
            if !minion.is_minion() {
                return RelayOutcome::Dropped("not_minion");
            }
            hooks.set_minion(&cycle.scope, &owner, &minion, relay.apply);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Charm, &queues.charm, |cycle, relay| {
            let target = resolve_keyed!(cycle, relay.target);
            let charmer = resolve_or_drop!(cycle, relay.charmer);
            if relay.apply {
                if let Some(aura_spell_id) = relay.aura_spell_id {
                    if !hooks.has_aura_from(&target, aura_spell_id, &charmer) {
                        return RelayOutcome::Dropped("charm_aura_missing");
                    }
                }
                hooks.set_charmed_by(&cycle.scope, &charmer, &target, relay.charm_type);
            } else {
                hooks.remove_charmed_by(&cycle.scope, &charmer, &target);
            }
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::GameObject, &queues.game_object, |cycle, relay| {
            let owner = resolve_keyed!(cycle, relay.owner);
            hooks.remove_game_object(&cycle.scope, &owner, &relay.action);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::CombatState, &queues.combat_state, |cycle, relay| {
            let unit = resolve_keyed!(cycle, relay.unit);
            let enemy = relay.enemy.and_then(|guid| cycle.resolve(guid));
            hooks.set_in_combat(&cycle.scope, &unit, enemy.as_ref(), relay.pvp, relay.duration_ms);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Attack, &queues.attack, |cycle, relay| {
            let attacker = resolve_keyed!(cycle, relay.attacker);
            let victim = resolve_or_drop!(cycle, relay.victim);
            hooks.attack(&cycle.scope, &attacker, &victim, relay.melee);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Evade, &queues.evade, |cycle, relay| {
            let creature = resolve_keyed!(cycle, relay.creature);
            if !creature.is_ai_enabled() {
                return RelayOutcome::Dropped("ai_disabled");
            }
            hooks.evade(&cycle.scope, &creature, relay.reason);
            RelayOutcome::Applied
        });

        cycle.drain_kind(RelayKind::Taunt, &queues.taunt, |cycle, relay| {
            let owner = resolve_or_drop!(cycle, relay.owner);
            let taunter = resolve_or_drop!(cycle, relay.taunter);
            hooks.taunt(&cycle.scope, &owner, &taunter, relay.action);
            RelayOutcome::Applied
        });

        let mut stats = cycle.stats;
        stats.lookup_cache_size = cycle.cache.len();
        stats.emitted_metrics = cycle.emit_metrics;
        stats.cycle_ms = started.elapsed().as_millis() as u64;

        if stats.cycle_ms >= self.config().slow_relay_cycle_ms {
            warn!(
                map = self.map_id(),
                partition = partition_id,
                cycle_ms = stats.cycle_ms,
                lookup_cache_size = stats.lookup_cache_size,
                emit_metrics = stats.emitted_metrics,
                "Slow partition relay cycle"
            );
        }
        stats
    }
}
