// map_partition_engine/server/src/operational/monitoring/metrics.rs
use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

use crate::core::types::{MapId, PartitionId};

static METRICS_DESCRIBED: OnceCell<()> = OnceCell::new();

/// Registers descriptions for every metric the engine emits. Safe to call
/// more than once.
pub fn describe_partition_metrics() {
    METRICS_DESCRIBED.get_or_init(|| {
        describe_gauge!("partition_relay_latency_ms", "Average enqueue-to-apply latency of relays applied this cycle");
        describe_gauge!("partition_relay_latency_max_ms", "Maximum enqueue-to-apply latency of relays applied this cycle");
        describe_gauge!("partition_relay_queue_depth", "Relays waiting in a partition queue at cycle start");
        describe_counter!("partition_relay_dropped_total", "Relays dropped instead of applied");
        describe_histogram!("partition_cycle_time_seconds", "Wall time of a full partition update cycle");
        describe_gauge!("partition_in_flight_limit", "Adaptive cap on concurrently running partition workers");
        describe_gauge!("partition_object_update_budget", "Adaptive per-tick object update budget");
    });
}

/// Installs the Prometheus exporter on `port` and describes all metrics.
pub fn install_prometheus_exporter(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    describe_partition_metrics();
    Ok(())
}

pub fn record_relay_latency(map_id: MapId, partition_id: PartitionId, kind: &'static str, avg_ms: u64, max_ms: u64) {
    gauge!(
        "partition_relay_latency_ms",
        "map_id" => map_id.to_string(),
        "partition_id" => partition_id.to_string(),
        "type" => kind
    )
    .set(avg_ms as f64);
    gauge!(
        "partition_relay_latency_max_ms",
        "map_id" => map_id.to_string(),
        "partition_id" => partition_id.to_string(),
        "type" => kind
    )
    .set(max_ms as f64);
}

pub fn record_relay_queue_depth(map_id: MapId, partition_id: PartitionId, kind: &'static str, depth: usize) {
    gauge!(
        "partition_relay_queue_depth",
        "map_id" => map_id.to_string(),
        "partition_id" => partition_id.to_string(),
        "type" => kind
    )
    .set(depth as f64);
}

pub fn record_relay_dropped(map_id: MapId, kind: &'static str, reason: &'static str) {
    counter!(
        "partition_relay_dropped_total",
        "map_id" => map_id.to_string(),
        "type" => kind,
        "reason" => reason
    )
    .increment(1);
}

pub fn record_cycle_time(map_id: MapId, seconds: f64) {
    histogram!("partition_cycle_time_seconds", "map_id" => map_id.to_string()).record(seconds);
}

pub fn record_scheduler_limits(map_id: MapId, in_flight_limit: usize, object_budget: usize) {
    gauge!("partition_in_flight_limit", "map_id" => map_id.to_string()).set(in_flight_limit as f64);
    gauge!("partition_object_update_budget", "map_id" => map_id.to_string()).set(object_budget as f64);
}

// Logging setup
pub fn init_logging() -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "map_partition_core=info,partition_soak=info,warn".into()))
        .with(fmt::layer().with_thread_names(true))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
