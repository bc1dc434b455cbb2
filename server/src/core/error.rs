// map_partition_engine/server/src/core/error.rs
use super::types::PartitionId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Threading error: {0}")]
    ThreadingError(String),

    #[error("Invalid partition id {partition} (partition count {count})")]
    InvalidPartition { partition: PartitionId, count: u32 },

    #[error("Relay queue '{kind}' for partition {partition} is full (limit {limit})")]
    RelayQueueFull {
        kind: &'static str,
        partition: PartitionId,
        limit: usize,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub type PartitionResult<T> = Result<T, PartitionError>;
