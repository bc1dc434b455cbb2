// map_partition_engine/server/src/world/mod.rs
pub mod objects;
pub mod partition;
pub mod relays;
pub mod update_list;
