// map_partition_engine/server/src/world/relays.rs
//! Typed relay payloads. A relay describes an effect that must run on the
//! partition owning its target instead of on the thread that produced it.
use crate::core::types::{ObjectGuid, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayKind {
    Threat,
    ThreatAction,
    Proc,
    Aura,
    Path,
    Point,
    Motion,
    Assist,
    AssistDistract,
    ThreatTargetAction,
    Combat,
    Loot,
    DynObject,
    Minion,
    Charm,
    GameObject,
    CombatState,
    Attack,
    Evade,
    Taunt,
}

impl RelayKind {
    /// Order in which a partition drains its queues.
    pub const DRAIN_ORDER: [RelayKind; 20] = [
        RelayKind::Threat,
        RelayKind::ThreatAction,
        RelayKind::Proc,
        RelayKind::Aura,
        RelayKind::Path,
        RelayKind::Point,
        RelayKind::Motion,
        RelayKind::Assist,
        RelayKind::AssistDistract,
        RelayKind::ThreatTargetAction,
        RelayKind::Combat,
        RelayKind::Loot,
        RelayKind::DynObject,
        RelayKind::Minion,
        RelayKind::Charm,
        RelayKind::GameObject,
        RelayKind::CombatState,
        RelayKind::Attack,
        RelayKind::Evade,
        RelayKind::Taunt,
    ];

    /// Metric label.
    pub const fn as_str(self) -> &'static str {
        match self {
            RelayKind::Threat => "threat",
            RelayKind::ThreatAction => "threat_action",
            RelayKind::Proc => "proc",
            RelayKind::Aura => "aura",
            RelayKind::Path => "path",
            RelayKind::Point => "point",
            RelayKind::Motion => "motion",
            RelayKind::Assist => "assist",
            RelayKind::AssistDistract => "assist_distract",
            RelayKind::ThreatTargetAction => "threat_target_action",
            RelayKind::Combat => "combat",
            RelayKind::Loot => "loot",
            RelayKind::DynObject => "dynobject",
            RelayKind::Minion => "minion",
            RelayKind::Charm => "charm",
            RelayKind::GameObject => "gameobject",
            RelayKind::CombatState => "combat_state",
            RelayKind::Attack => "attack",
            RelayKind::Evade => "evade",
            RelayKind::Taunt => "taunt",
        }
    }
}

/// A relay as it sits in a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Queued<T> {
    pub relay: T,
    /// Game time at first enqueue; 0 when unstamped.
    pub queued_ms: u64,
    pub bounce_count: u8,
}

impl<T> Queued<T> {
    pub fn new(relay: T, queued_ms: u64) -> Self {
        Queued { relay, queued_ms, bounce_count: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatRelay {
    pub owner: ObjectGuid,
    pub victim: ObjectGuid,
    pub threat: f32,
    pub school_mask: u32,
    pub spell_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatAction {
    ClearAll,
    ResetAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatActionRelay {
    pub owner: ObjectGuid,
    pub action: ThreatAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatTargetAction {
    Clear,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatTargetActionRelay {
    pub owner: ObjectGuid,
    pub target: ObjectGuid,
    pub action: ThreatTargetAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TauntAction {
    Apply,
    Fade,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TauntRelay {
    pub owner: ObjectGuid,
    pub taunter: ObjectGuid,
    pub action: TauntAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombatRelay {
    pub owner: ObjectGuid,
    pub victim: ObjectGuid,
    pub initial_aggro: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LootRelay {
    pub creature: ObjectGuid,
    pub recipient: Option<ObjectGuid>,
    pub with_group: bool,
}

/// Removes a dynamic object (area effect) from the world.
#[derive(Debug, Clone, PartialEq)]
pub struct DynObjectRelay {
    pub dyn_object: ObjectGuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinionRelay {
    pub owner: ObjectGuid,
    pub minion: ObjectGuid,
    pub apply: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharmRelay {
    pub charmer: ObjectGuid,
    pub target: ObjectGuid,
    pub charm_type: u8,
    /// When set, applying requires the target to carry this aura from the charmer.
    pub aura_spell_id: Option<u32>,
    pub apply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameObjectAction {
    Remove { game_object: ObjectGuid, delete: bool },
    RemoveBySpell { spell_id: u32, delete: bool },
    RemoveAll { delete: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameObjectRelay {
    pub owner: ObjectGuid,
    pub action: GameObjectAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombatStateRelay {
    pub unit: ObjectGuid,
    pub enemy: Option<ObjectGuid>,
    pub pvp: bool,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackRelay {
    pub attacker: ObjectGuid,
    pub victim: ObjectGuid,
    pub melee: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvadeRelay {
    pub creature: ObjectGuid,
    pub reason: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcRelay {
    pub actor: ObjectGuid,
    pub target: ObjectGuid,
    pub proc_flag: u32,
    pub proc_extra: u32,
    pub amount: u32,
    pub attack_type: u8,
    pub proc_spell_id: Option<u32>,
    pub proc_aura_id: Option<u32>,
    pub proc_aura_effect_index: Option<u8>,
    pub proc_phase: u32,
    pub is_victim: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuraAction {
    Apply,
    Remove { remove_mode: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuraRelay {
    pub caster: ObjectGuid,
    pub target: ObjectGuid,
    pub spell_id: u32,
    pub eff_mask: u8,
    pub action: AuraAction,
}

/// Chase movement toward `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRelay {
    pub mover: ObjectGuid,
    pub target: ObjectGuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointRelay {
    pub mover: ObjectGuid,
    pub point_id: u32,
    pub destination: Position,
    pub forced_movement: u8,
    pub speed: Option<f32>,
    pub generate_path: bool,
    pub force_destination: bool,
    pub slot: u8,
    pub anim_tier: Option<u8>,
}

impl PointRelay {
    pub fn new(mover: ObjectGuid, point_id: u32, destination: Position) -> Self {
        PointRelay {
            mover,
            point_id,
            destination,
            forced_movement: 0,
            speed: None,
            generate_path: true,
            force_destination: true,
            slot: 0,
            anim_tier: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistRelay {
    pub mover: ObjectGuid,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistDistractRelay {
    pub mover: ObjectGuid,
    pub time_ms: u32,
}

/// Motion-master commands that can be relayed.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionAction {
    Jump { destination: Position, speed_xy: f32, speed_z: f32, id: u32, target: Option<ObjectGuid> },
    Fall { id: u32, add_flag_for_npc: bool },
    Charge { destination: Position, speed: f32, id: u32, path: Vec<Position>, generate_path: bool, target: Option<ObjectGuid> },
    ChargePath { destination: Position, speed: f32, id: u32, path: Vec<Position>, target: Option<ObjectGuid> },
    Flee { enemy: ObjectGuid, time_ms: u32 },
    Distract { time_ms: u32 },
    Backwards { target: ObjectGuid, dist: f32 },
    Forwards { target: ObjectGuid, dist: f32 },
    Circle { target: ObjectGuid },
    SplinePath { path: Vec<Position>, forced_movement: u8 },
    Path { path_id: u32, forced_movement: u8, path_source: u8 },
    Land { id: u32, destination: Position, speed: f32 },
    Takeoff { id: u32, destination: Position, speed: f32, skip_animation: bool },
    Knockback { origin_x: f32, origin_y: f32, speed_xy: f32, speed_z: f32 },
    Stop,
    StopOnPosition,
    FaceOrientation { orientation: f32 },
    FaceObject { target: ObjectGuid, time_ms: u32 },
    MonsterMove { destination: Position, speed: f32 },
    TransportEnter { destination: Position },
    TransportExit {
        destination: Position,
        disable_spline: bool,
        knockback_origin: (f32, f32),
        speed_xy: f32,
        speed_z: f32,
        spell_id: Option<u32>,
    },
    PassengerRelocate { destination: Position },
    VehicleTeleportPlayer { destination: Position },
}

impl MotionAction {
    /// Secondary participant that must resolve before the action applies.
    pub fn required_target(&self) -> Option<ObjectGuid> {
        match self {
            MotionAction::Flee { enemy, .. } => Some(*enemy),
            MotionAction::Backwards { target, .. }
            | MotionAction::Forwards { target, .. }
            | MotionAction::Circle { target }
            | MotionAction::FaceObject { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Secondary participant that is passed along when it resolves.
    pub fn optional_target(&self) -> Option<ObjectGuid> {
        match self {
            MotionAction::Jump { target, .. }
            | MotionAction::Charge { target, .. }
            | MotionAction::ChargePath { target, .. } => *target,
            _ => None,
        }
    }

    /// Spline actions with an empty point list are ignored.
    pub fn has_required_path(&self) -> bool {
        match self {
            MotionAction::ChargePath { path, .. } | MotionAction::SplinePath { path, .. } => !path.is_empty(),
            _ => true,
        }
    }

    pub fn requires_player_mover(&self) -> bool {
        matches!(self, MotionAction::VehicleTeleportPlayer { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            MotionAction::Jump { .. } => "jump",
            MotionAction::Fall { .. } => "fall",
            MotionAction::Charge { .. } => "charge",
            MotionAction::ChargePath { .. } => "charge_path",
            MotionAction::Flee { .. } => "flee",
            MotionAction::Distract { .. } => "distract",
            MotionAction::Backwards { .. } => "backwards",
            MotionAction::Forwards { .. } => "forwards",
            MotionAction::Circle { .. } => "circle",
            MotionAction::SplinePath { .. } => "spline_path",
            MotionAction::Path { .. } => "path",
            MotionAction::Land { .. } => "land",
            MotionAction::Takeoff { .. } => "takeoff",
            MotionAction::Knockback { .. } => "knockback",
            MotionAction::Stop => "stop",
            MotionAction::StopOnPosition => "stop_on_position",
            MotionAction::FaceOrientation { .. } => "face_orientation",
            MotionAction::FaceObject { .. } => "face_object",
            MotionAction::MonsterMove { .. } => "monster_move",
            MotionAction::TransportEnter { .. } => "transport_enter",
            MotionAction::TransportExit { .. } => "transport_exit",
            MotionAction::PassengerRelocate { .. } => "passenger_relocate",
            MotionAction::VehicleTeleportPlayer { .. } => "vehicle_teleport_player",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionRelay {
    pub mover: ObjectGuid,
    pub action: MotionAction,
}
