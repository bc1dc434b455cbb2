// map_partition_engine/server/src/server/hooks.rs
use super::context::WorkerScope;
use crate::core::types::Position;
use crate::world::objects::WorldObject;
use crate::world::relays::{
    GameObjectAction, MotionAction, PointRelay, ProcRelay, TauntAction, ThreatAction, ThreatRelay,
    ThreatTargetAction,
};
use std::sync::Arc;

pub type ObjectRef = Arc<WorldObject>;

/// Game logic the engine calls into. Effects arrive with every participant
/// already resolved and checked to be in world, on the thread of the
/// partition that owns the target.
///
/// Every method defaults to doing nothing so collaborators only implement
/// what they care about.
#[allow(unused_variables)]
pub trait WorldHooks: Send + Sync {
    // Threat
    fn add_threat(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, victim: &ObjectRef, relay: &ThreatRelay) {}
    fn threat_action(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, action: ThreatAction) {}
    fn threat_target_action(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, target: &ObjectRef, action: ThreatTargetAction) {}
    fn taunt(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, taunter: &ObjectRef, action: TauntAction) {}

    // Combat
    fn start_combat(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, victim: &ObjectRef, initial_aggro: bool) {}
    fn set_in_combat(&self, scope: &WorkerScope<'_>, unit: &ObjectRef, enemy: Option<&ObjectRef>, pvp: bool, duration_ms: u32) {}
    fn attack(&self, scope: &WorkerScope<'_>, attacker: &ObjectRef, victim: &ObjectRef, melee: bool) {}
    fn evade(&self, scope: &WorkerScope<'_>, creature: &ObjectRef, reason: u8) {}
    fn set_loot_recipient(&self, scope: &WorkerScope<'_>, creature: &ObjectRef, recipient: Option<&ObjectRef>, with_group: bool) {}

    // Spells
    fn trigger_proc(&self, scope: &WorkerScope<'_>, actor: &ObjectRef, target: &ObjectRef, relay: &ProcRelay) {}
    fn spell_exists(&self, spell_id: u32) -> bool {
        true
    }
    fn has_aura_from(&self, target: &ObjectRef, spell_id: u32, caster: &ObjectRef) -> bool {
        false
    }
    fn add_aura(&self, scope: &WorkerScope<'_>, caster: &ObjectRef, target: &ObjectRef, spell_id: u32, eff_mask: u8) {}
    fn remove_aura(&self, scope: &WorkerScope<'_>, caster: &ObjectRef, target: &ObjectRef, spell_id: u32, eff_mask: u8, remove_mode: u8) {}
    fn remove_dynamic_object(&self, scope: &WorkerScope<'_>, dyn_object: &ObjectRef) {}
    fn remove_game_object(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, action: &GameObjectAction) {}

    // Ownership
    fn set_minion(&self, scope: &WorkerScope<'_>, owner: &ObjectRef, minion: &ObjectRef, apply: bool) {}
    fn set_charmed_by(&self, scope: &WorkerScope<'_>, charmer: &ObjectRef, target: &ObjectRef, charm_type: u8) {}
    fn remove_charmed_by(&self, scope: &WorkerScope<'_>, charmer: &ObjectRef, target: &ObjectRef) {}

    // Movement
    fn move_chase(&self, scope: &WorkerScope<'_>, mover: &ObjectRef, target: &ObjectRef) {}
    fn move_point(&self, scope: &WorkerScope<'_>, mover: &ObjectRef, relay: &PointRelay) {}
    fn apply_motion(&self, scope: &WorkerScope<'_>, mover: &ObjectRef, action: &MotionAction, target: Option<&ObjectRef>) {}
    fn move_seek_assistance(&self, scope: &WorkerScope<'_>, mover: &ObjectRef, x: f32, y: f32, z: f32) {}
    fn move_seek_assistance_distract(&self, scope: &WorkerScope<'_>, mover: &ObjectRef, time_ms: u32) {}

    // Tick
    /// Whether a non-player object should stay on its partition's update list.
    fn wants_update(&self, object: &ObjectRef) -> bool {
        object.needs_update()
    }
    fn update_player(&self, scope: &WorkerScope<'_>, player: &ObjectRef, diff_ms: u32) {}
    fn update_object(&self, scope: &WorkerScope<'_>, object: &ObjectRef, diff_ms: u32) {}
    fn update_visibility(&self, scope: &WorkerScope<'_>, object: &ObjectRef) {}
    fn relocate_player(&self, scope: &WorkerScope<'_>, player: &ObjectRef, destination: Position) {}
    fn send_object_updates(&self, scope: &WorkerScope<'_>, objects: &[ObjectRef]) {}
}

/// Hooks that ignore every effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl WorldHooks for NoopHooks {}
