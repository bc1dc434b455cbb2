// map_partition_engine/server/src/server/mod.rs
pub mod context;
pub mod deferred;
pub mod hooks;
pub mod locks;
pub mod map;
pub mod relay_processor;
pub mod relay_queue;
pub mod scheduler;
pub mod worker;
