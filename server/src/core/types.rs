// map_partition_engine/server/src/core/types.rs
use super::constants::{
    CENTER_GRID_CELL_ID, CENTER_GRID_CELL_OFFSET, CENTER_GRID_ID, CENTER_GRID_OFFSET,
    MAX_NUMBER_OF_GRIDS, SIZE_OF_GRIDS, SIZE_OF_GRID_CELL, TOTAL_NUMBER_OF_CELLS_PER_MAP,
};
use once_cell::sync::Lazy;
use std::fmt;
use std::time::Instant;

pub type MapId = u32;
pub type PartitionId = u32;

/// Partition id reserved for "unpartitioned / global" work.
pub const GLOBAL_PARTITION: PartitionId = 0;

static GAME_CLOCK_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic game clock in milliseconds. Never returns 0, so a zero
/// timestamp can be used as "not stamped".
#[inline]
pub fn game_time_ms() -> u64 {
    GAME_CLOCK_START.elapsed().as_millis() as u64 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeId {
    Player = 1,
    Unit = 2,
    GameObject = 3,
    DynamicObject = 4,
    Corpse = 5,
}

impl TypeId {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(TypeId::Player),
            2 => Some(TypeId::Unit),
            3 => Some(TypeId::GameObject),
            4 => Some(TypeId::DynamicObject),
            5 => Some(TypeId::Corpse),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeId::Player => "Player",
            TypeId::Unit => "Unit",
            TypeId::GameObject => "GameObject",
            TypeId::DynamicObject => "DynamicObject",
            TypeId::Corpse => "Corpse",
        }
    }
}

const GUID_TYPE_SHIFT: u32 = 56;
const GUID_COUNTER_MASK: u64 = (1u64 << GUID_TYPE_SHIFT) - 1;

/// Stable object identifier. The high byte carries the type tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectGuid(u64);

impl ObjectGuid {
    pub const EMPTY: ObjectGuid = ObjectGuid(0);

    pub fn new(type_id: TypeId, counter: u64) -> Self {
        ObjectGuid(((type_id as u64) << GUID_TYPE_SHIFT) | (counter & GUID_COUNTER_MASK))
    }

    pub fn from_raw(raw: u64) -> Self {
        ObjectGuid(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn counter(self) -> u64 {
        self.0 & GUID_COUNTER_MASK
    }

    #[inline]
    pub fn type_id(self) -> Option<TypeId> {
        TypeId::from_raw((self.0 >> GUID_TYPE_SHIFT) as u8)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_player(self) -> bool {
        self.type_id() == Some(TypeId::Player)
    }

    #[inline]
    pub fn is_unit(self) -> bool {
        matches!(self.type_id(), Some(TypeId::Player) | Some(TypeId::Unit))
    }
}

impl fmt::Debug for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_id() {
            Some(type_id) => write!(f, "{}-{}", type_id.as_str(), self.counter()),
            None if self.is_empty() => write!(f, "Empty"),
            None => write!(f, "Unknown-{:#x}", self.0),
        }
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub o: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32, o: f32) -> Self {
        Position { x, y, z, o }
    }

    pub fn xy(x: f32, y: f32) -> Self {
        Position { x, y, z: 0.0, o: 0.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

impl CellCoord {
    /// Flat id used by the cell-mark bitset.
    #[inline]
    pub fn id(self) -> u32 {
        self.y * TOTAL_NUMBER_OF_CELLS_PER_MAP + self.x
    }
}

#[inline]
fn compute_axis(value: f32, center_offset: f32, size: f32, center_id: u32, limit: u32) -> u32 {
    let offset = (f64::from(value) - f64::from(center_offset)) / f64::from(size);
    let coord = (offset + f64::from(center_id) + 0.5).floor();
    coord.clamp(0.0, f64::from(limit - 1)) as u32
}

pub fn compute_grid_coord(x: f32, y: f32) -> GridCoord {
    GridCoord {
        x: compute_axis(x, CENTER_GRID_OFFSET, SIZE_OF_GRIDS, CENTER_GRID_ID, MAX_NUMBER_OF_GRIDS),
        y: compute_axis(y, CENTER_GRID_OFFSET, SIZE_OF_GRIDS, CENTER_GRID_ID, MAX_NUMBER_OF_GRIDS),
    }
}

pub fn compute_cell_coord(x: f32, y: f32) -> CellCoord {
    CellCoord {
        x: compute_axis(
            x,
            CENTER_GRID_CELL_OFFSET,
            SIZE_OF_GRID_CELL,
            CENTER_GRID_CELL_ID,
            TOTAL_NUMBER_OF_CELLS_PER_MAP,
        ),
        y: compute_axis(
            y,
            CENTER_GRID_CELL_OFFSET,
            SIZE_OF_GRID_CELL,
            CENTER_GRID_CELL_ID,
            TOTAL_NUMBER_OF_CELLS_PER_MAP,
        ),
    }
}
