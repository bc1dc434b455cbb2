// map_partition_engine/server/src/concurrent/mod.rs
pub mod cell_marks;
pub mod relay_channel;
pub mod thread_pools;
