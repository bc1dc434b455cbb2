// map_partition_engine/server/src/operational/mod.rs
pub mod monitoring;
