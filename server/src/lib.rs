// map_partition_engine/server/src/lib.rs

pub mod concurrent;
pub mod core;
pub mod operational;
pub mod server;
pub mod world;

pub use crate::server::context::{PartitionContext, VisibilityDeferGuard, WorkerScope};
pub use crate::server::hooks::{NoopHooks, ObjectRef, WorldHooks};
pub use crate::server::map::PartitionedMap;
