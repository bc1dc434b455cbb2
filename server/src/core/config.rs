// map_partition_engine/server/src/core/config.rs
use super::constants::{
    DEFAULT_BORDER_OVERLAP, DEFAULT_IN_FLIGHT_LIMIT, DEFAULT_OBJECT_UPDATE_BUDGET,
    DEFAULT_PARTITION_COUNT, DEFERRED_VISIBILITY_BUDGET, MAX_OBJECT_UPDATE_BUDGET, MAX_RELAY_BOUNCES,
    PARTITION_RELAY_LIMIT, RELAY_METRICS_EVERY_N_TICKS, SERVER_TICK_RATE,
    SLOW_PARTITION_CYCLE_LOG_INTERVAL_MS, SLOW_PARTITION_CYCLE_MS, SLOW_PARTITION_WORKER_MS,
    SLOW_RELAY_CYCLE_MS,
};
use super::error::{PartitionError, PartitionResult};
use super::types::MapId;
use serde::Deserialize;
use std::path::Path;

/// What a relay queue does once it already holds `relay_queue_limit` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayOverflowPolicy {
    /// Reject the new relay and log it.
    #[default]
    Drop,
    /// Keep queueing; the limit only sizes the post-drain reservation.
    Grow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// 0 means one worker per logical core.
    pub partition_threads: usize,
    pub pin_threads: bool,
    pub first_core: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        ThreadPoolConfig {
            partition_threads: 0,
            pin_threads: false,
            first_core: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub enabled: bool,
    pub parallel: bool,
    pub partition_count: u32,
    pub relay_queue_limit: usize,
    pub relay_overflow_policy: RelayOverflowPolicy,
    pub max_relay_bounces: u8,
    pub slow_relay_cycle_ms: u64,
    pub relay_metrics_every_n_ticks: u64,
    pub in_flight_limit: usize,
    pub object_update_budget: usize,
    pub carry_over: bool,
    pub deferred_visibility_budget: usize,
    pub slow_cycle_threshold_ms: u64,
    pub slow_cycle_log_interval_ms: u64,
    pub slow_worker_threshold_ms: u64,
    pub border_overlap: f32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig {
            enabled: true,
            parallel: true,
            partition_count: DEFAULT_PARTITION_COUNT,
            relay_queue_limit: PARTITION_RELAY_LIMIT,
            relay_overflow_policy: RelayOverflowPolicy::Drop,
            max_relay_bounces: MAX_RELAY_BOUNCES,
            slow_relay_cycle_ms: SLOW_RELAY_CYCLE_MS,
            relay_metrics_every_n_ticks: RELAY_METRICS_EVERY_N_TICKS,
            in_flight_limit: DEFAULT_IN_FLIGHT_LIMIT,
            object_update_budget: DEFAULT_OBJECT_UPDATE_BUDGET,
            carry_over: true,
            deferred_visibility_budget: DEFERRED_VISIBILITY_BUDGET,
            slow_cycle_threshold_ms: SLOW_PARTITION_CYCLE_MS,
            slow_cycle_log_interval_ms: SLOW_PARTITION_CYCLE_LOG_INTERVAL_MS,
            slow_worker_threshold_ms: SLOW_PARTITION_WORKER_MS,
            border_overlap: DEFAULT_BORDER_OVERLAP,
        }
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> PartitionResult<()> {
        if self.partition_count == 0 {
            return Err(PartitionError::ConfigError("partition_count must be at least 1".into()));
        }
        if self.relay_queue_limit == 0 {
            return Err(PartitionError::ConfigError("relay_queue_limit must be at least 1".into()));
        }
        if self.in_flight_limit == 0 {
            return Err(PartitionError::ConfigError("in_flight_limit must be at least 1".into()));
        }
        if self.relay_metrics_every_n_ticks == 0 {
            return Err(PartitionError::ConfigError(
                "relay_metrics_every_n_ticks must be at least 1".into(),
            ));
        }
        if self.object_update_budget == 0 || self.deferred_visibility_budget == 0 {
            return Err(PartitionError::ConfigError("update budgets must be non-zero".into()));
        }
        if self.object_update_budget > MAX_OBJECT_UPDATE_BUDGET {
            return Err(PartitionError::ConfigError(format!(
                "object_update_budget must not exceed {}",
                MAX_OBJECT_UPDATE_BUDGET
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_rate: u64,
    pub map_id: MapId,
    pub soak_units: usize,
    pub soak_ticks: u64,
    pub metrics_port: Option<u16>,
    pub thread_pools: ThreadPoolConfig,
    pub partitions: PartitionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tick_rate: SERVER_TICK_RATE,
            map_id: 0,
            soak_units: 2000,
            soak_ticks: 200,
            metrics_port: None,
            thread_pools: ThreadPoolConfig::default(),
            partitions: PartitionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(source: &str) -> PartitionResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> PartitionResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    pub fn validate(&self) -> PartitionResult<()> {
        if self.tick_rate == 0 {
            return Err(PartitionError::ConfigError("tick_rate must be at least 1".into()));
        }
        self.partitions.validate()
    }

    pub fn tick_interval_ms(&self) -> u64 {
        (1000 / self.tick_rate.max(1)).max(1)
    }
}
