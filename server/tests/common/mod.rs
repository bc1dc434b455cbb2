// map_partition_engine/server/tests/common/mod.rs
#![allow(dead_code)]

use map_partition_core::concurrent::thread_pools::PartitionWorkerPool;
use map_partition_core::core::config::{PartitionConfig, ThreadPoolConfig};
use map_partition_core::core::types::{ObjectGuid, PartitionId, Position, TypeId};
use map_partition_core::world::objects::WorldObject;
use map_partition_core::world::relays::{MotionAction, PointRelay, ThreatRelay};
use map_partition_core::{ObjectRef, PartitionContext, PartitionedMap, WorkerScope, WorldHooks};

use crossbeam::queue::SegQueue;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;

/// Positions that land in each partition of a 4-partition (2x2) layout.
pub const P1: (f32, f32) = (-5000.0, -5000.0);
pub const P2: (f32, f32) = (5000.0, -5000.0);
pub const P3: (f32, f32) = (-5000.0, 5000.0);
pub const P4: (f32, f32) = (5000.0, 5000.0);

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Threat { owner: ObjectGuid, victim: ObjectGuid, partition: PartitionId },
    Combat { owner: ObjectGuid, victim: ObjectGuid, partition: PartitionId, processing_relays: bool },
    Minion { owner: ObjectGuid, minion: ObjectGuid, apply: bool, partition: PartitionId },
    Charmed { charmer: ObjectGuid, target: ObjectGuid },
    AuraApplied { caster: ObjectGuid, target: ObjectGuid, spell_id: u32 },
    Evade { creature: ObjectGuid, partition: PartitionId },
    Motion { mover: ObjectGuid, action: &'static str, target: Option<ObjectGuid> },
    Point { mover: ObjectGuid, point_id: u32 },
    ObjectUpdated { guid: ObjectGuid, partition: PartitionId },
    PlayerUpdated { guid: ObjectGuid, partition: PartitionId },
    Visibility { guid: ObjectGuid },
    Relocated { guid: ObjectGuid, destination: Position },
}

type UpdateCallback = Box<dyn Fn(&WorkerScope<'_>, &ObjectRef) + Send + Sync>;
type RelocateCallback = Box<dyn Fn(&WorkerScope<'_>, &ObjectRef, Position) + Send + Sync>;

/// Hooks that record every effect the engine applies.
#[derive(Default)]
pub struct RecordingHooks {
    effects: SegQueue<Effect>,
    auras: DashSet<(ObjectGuid, u32, ObjectGuid)>,
    retired: DashSet<ObjectGuid>,
    update_counts: DashMap<ObjectGuid, u32>,
    on_update: Option<UpdateCallback>,
    on_relocate: Option<RelocateCallback>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hooks that also run `callback` for every non-player object update.
    pub fn with_update_callback<F>(callback: F) -> Arc<Self>
    where
        F: Fn(&WorkerScope<'_>, &ObjectRef) + Send + Sync + 'static,
    {
        Arc::new(RecordingHooks { on_update: Some(Box::new(callback)), ..Self::default() })
    }

    /// Hooks that also run `callback` after every player relocation.
    pub fn with_relocate_callback<F>(callback: F) -> Arc<Self>
    where
        F: Fn(&WorkerScope<'_>, &ObjectRef, Position) + Send + Sync + 'static,
    {
        Arc::new(RecordingHooks { on_relocate: Some(Box::new(callback)), ..Self::default() })
    }

    pub fn take_effects(&self) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Some(effect) = self.effects.pop() {
            effects.push(effect);
        }
        effects
    }

    pub fn grant_aura(&self, target: ObjectGuid, spell_id: u32, caster: ObjectGuid) {
        self.auras.insert((target, spell_id, caster));
    }

    /// Makes `guid` report that it no longer needs per-tick updates.
    pub fn retire(&self, guid: ObjectGuid) {
        self.retired.insert(guid);
    }

    pub fn update_count(&self, guid: ObjectGuid) -> u32 {
        self.update_counts.get(&guid).map_or(0, |count| *count)
    }

    fn record(&self, effect: Effect) {
        self.effects.push(effect);
    }
}

impl WorldHooks for RecordingHooks {
    fn add_threat(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, victim: &ObjectRef, _relay: &ThreatRelay) {
        self.record(Effect::Threat { owner: owner.guid(), victim: victim.guid(), partition: scope.partition_id() });
    }

    fn start_combat(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, victim: &ObjectRef, _initial_aggro: bool) {
        self.record(Effect::Combat {
            owner: owner.guid(),
            victim: victim.guid(),
            partition: scope.partition_id(),
            processing_relays: scope.ctx.is_processing_relays(),
        });
    }

    fn set_minion(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, minion: &ObjectRef, apply: bool) {
        self.record(Effect::Minion { owner: owner.guid(), minion: minion.guid(), apply, partition: scope.partition_id() });
    }

    fn set_charmed_by(&self, _scope: &WorkerScope<'_>, charmer: &ObjectRef, target: &ObjectRef, _charm_type: u8) {
        self.record(Effect::Charmed { charmer: charmer.guid(), target: target.guid() });
    }

    fn has_aura_from(&self, target: &ObjectRef, spell_id: u32, caster: &ObjectRef) -> bool {
        self.auras.contains(&(target.guid(), spell_id, caster.guid()))
    }

    fn add_aura(&self, _scope: &WorkerScope<'_>, caster: &ObjectRef, target: &ObjectRef, spell_id: u32, _eff_mask: u8) {
        self.grant_aura(target.guid(), spell_id, caster.guid());
        self.record(Effect::AuraApplied { caster: caster.guid(), target: target.guid(), spell_id });
    }

    fn evade(&self, scope: &WorkerScope<'_>, creature: &ObjectRef, _reason: u8) {
        self.record(Effect::Evade { creature: creature.guid(), partition: scope.partition_id() });
    }

    fn apply_motion(&self, _scope: &WorkerScope<'_>, mover: &ObjectRef, action: &MotionAction, target: Option<&ObjectRef>) {
        self.record(Effect::Motion { mover: mover.guid(), action: action.name(), target: target.map(|t| t.guid()) });
    }

    fn move_point(&self, _scope: &WorkerScope<'_>, mover: &ObjectRef, relay: &PointRelay) {
        self.record(Effect::Point { mover: mover.guid(), point_id: relay.point_id });
    }

    fn update_player(&self, scope: &WorkerScope<'_>, player: &ObjectRef, _diff_ms: u32) {
        self.record(Effect::PlayerUpdated { guid: player.guid(), partition: scope.partition_id() });
    }

    fn update_object(&self, scope: &WorkerScope<'_>, object: &ObjectRef, _diff_ms: u32) {
        *self.update_counts.entry(object.guid()).or_insert(0) += 1;
        self.record(Effect::ObjectUpdated { guid: object.guid(), partition: scope.partition_id() });
        if let Some(callback) = &self.on_update {
            callback(scope, object);
        }
    }

    fn wants_update(&self, object: &ObjectRef) -> bool {
        object.needs_update() && !self.retired.contains(&object.guid())
    }

    fn update_visibility(&self, _scope: &WorkerScope<'_>, object: &ObjectRef) {
        self.record(Effect::Visibility { guid: object.guid() });
    }

    fn relocate_player(&self, scope: &WorkerScope<'_>, player: &ObjectRef, destination: Position) {
        self.record(Effect::Relocated { guid: player.guid(), destination });
        if let Some(callback) = &self.on_relocate {
            callback(scope, player, destination);
        }
    }
}

pub fn partition_config(partition_count: u32) -> PartitionConfig {
    PartitionConfig { partition_count, ..PartitionConfig::default() }
}

/// Map without a worker pool; cycles run serially on the calling thread.
pub fn serial_map(config: PartitionConfig, hooks: Arc<RecordingHooks>) -> Arc<PartitionedMap> {
    Arc::new(PartitionedMap::new(1, config, hooks, None).expect("valid config"))
}

pub fn pooled_map(config: PartitionConfig, hooks: Arc<RecordingHooks>, threads: usize) -> Arc<PartitionedMap> {
    let pool = PartitionWorkerPool::new(&ThreadPoolConfig { partition_threads: threads, ..ThreadPoolConfig::default() })
        .expect("Failed to create partition pool");
    Arc::new(PartitionedMap::new(1, config, hooks, Some(Arc::new(pool))).expect("valid config"))
}

pub fn creature(counter: u64, (x, y): (f32, f32)) -> Arc<WorldObject> {
    Arc::new(WorldObject::new(ObjectGuid::new(TypeId::Unit, counter), Position::xy(x, y)))
}

pub fn player(counter: u64, (x, y): (f32, f32)) -> Arc<WorldObject> {
    Arc::new(WorldObject::new(ObjectGuid::new(TypeId::Player, counter), Position::xy(x, y)))
}

/// Adds `object` from outside any partition worker.
pub fn spawn(map: &PartitionedMap, object: &Arc<WorldObject>) {
    map.add_to_map(&PartitionContext::global(), Arc::clone(object));
}
