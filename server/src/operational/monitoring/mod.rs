// map_partition_engine/server/src/operational/monitoring/mod.rs
pub mod metrics;
