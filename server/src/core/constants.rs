// map_partition_engine/server/src/core/constants.rs
use std::time::Duration;

pub const SERVER_TICK_RATE: u64 = 20;
pub const TICK_DURATION_MS: u64 = 1000 / SERVER_TICK_RATE;
pub const TICK_DURATION: Duration = Duration::from_millis(TICK_DURATION_MS);

// Map grid geometry
pub const MAX_NUMBER_OF_GRIDS: u32 = 64;
pub const SIZE_OF_GRIDS: f32 = 533.333_33;
pub const CENTER_GRID_ID: u32 = MAX_NUMBER_OF_GRIDS / 2;
pub const CENTER_GRID_OFFSET: f32 = SIZE_OF_GRIDS / 2.0;
pub const MAX_NUMBER_OF_CELLS: u32 = 8;
pub const SIZE_OF_GRID_CELL: f32 = SIZE_OF_GRIDS / MAX_NUMBER_OF_CELLS as f32;
pub const TOTAL_NUMBER_OF_CELLS_PER_MAP: u32 = MAX_NUMBER_OF_GRIDS * MAX_NUMBER_OF_CELLS;
pub const CENTER_GRID_CELL_ID: u32 = TOTAL_NUMBER_OF_CELLS_PER_MAP / 2;
pub const CENTER_GRID_CELL_OFFSET: f32 = SIZE_OF_GRID_CELL / 2.0;
pub const MARKED_CELL_COUNT: usize = (TOTAL_NUMBER_OF_CELLS_PER_MAP * TOTAL_NUMBER_OF_CELLS_PER_MAP) as usize;
pub const MAP_INVALID_ZONE: u32 = u32::MAX;

// Relay queues
pub const PARTITION_RELAY_LIMIT: usize = 1024;
pub const MAX_RELAY_BOUNCES: u8 = 3;
pub const SLOW_RELAY_CYCLE_MS: u64 = 10;
pub const RELAY_METRICS_EVERY_N_TICKS: u64 = 10;

// Partition scheduling
pub const DEFAULT_PARTITION_COUNT: u32 = 4;
pub const DEFAULT_IN_FLIGHT_LIMIT: usize = 4;
pub const DEFAULT_OBJECT_UPDATE_BUDGET: usize = 2048;
pub const MIN_OBJECT_UPDATE_BUDGET: usize = 256;
pub const MAX_OBJECT_UPDATE_BUDGET: usize = 16384;
pub const SLOW_PARTITION_CYCLE_MS: u64 = 90;
pub const SLOW_PARTITION_CYCLE_LOG_INTERVAL_MS: u64 = 5000;
pub const SLOW_PARTITION_WORKER_MS: u64 = 80;
pub const DEFAULT_BORDER_OVERLAP: f32 = 40.0;

// Deferred passes
pub const DEFERRED_VISIBILITY_BUDGET: usize = 512;
