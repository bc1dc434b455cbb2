// map_partition_engine/server/src/concurrent/thread_pools.rs
use crate::core::config::ThreadPoolConfig;
use crate::core::error::{PartitionError, PartitionResult};
use core_affinity::CoreId;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Worker pool that runs one partition update task per active partition.
pub struct PartitionWorkerPool {
    pool: Arc<ThreadPool>,
    threads: usize,
}

impl PartitionWorkerPool {
    pub fn new(config: &ThreadPoolConfig) -> PartitionResult<Self> {
        let threads = if config.partition_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.partition_threads
        };

        let pool = if config.pin_threads {
            let core_ids = Arc::new(core_affinity::get_core_ids());
            if core_ids.is_none() {
                warn!("Could not get core IDs. Core affinity will not be applied.");
            }
            let core_indices: Vec<usize> = (config.first_core..config.first_core + threads).collect();
            Self::create_pool("partition", threads, core_indices, core_ids)?
        } else {
            ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("partition-{}", i))
                .build()
                .map_err(|e| PartitionError::ThreadingError(format!("Failed to build partition pool: {}", e)))?
        };

        info!(threads, pinned = config.pin_threads, "Partition worker pool initialized");
        Ok(PartitionWorkerPool { pool: Arc::new(pool), threads })
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    #[inline]
    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(task);
    }

    fn create_pool(
        name_str: &str,
        num_threads: usize,
        core_indices_to_use: Vec<usize>,
        all_available_core_ids: Arc<Option<Vec<CoreId>>>,
    ) -> PartitionResult<ThreadPool> {
        let name_for_thread_name = name_str.to_string();
        let name_for_start_handler = name_str.to_string();

        ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(move |i| format!("{}-{}", name_for_thread_name, i))
            .start_handler(move |thread_idx_in_pool| {
                let Some(available_core_ids) = all_available_core_ids.as_ref().as_ref() else {
                    return;
                };
                let Some(&global_core_idx) = core_indices_to_use.get(thread_idx_in_pool) else {
                    warn!(
                        "Thread {}-{} has no specific core assignment. No affinity set.",
                        name_for_start_handler, thread_idx_in_pool
                    );
                    return;
                };
                match available_core_ids.get(global_core_idx) {
                    Some(core_id) if core_affinity::set_for_current(*core_id) => {
                        info!(
                            "Pinned thread {}-{} to core ID {:?}",
                            name_for_start_handler, thread_idx_in_pool, core_id.id
                        );
                    }
                    Some(core_id) => {
                        error!(
                            "Failed to pin thread {}-{} to core ID {:?}",
                            name_for_start_handler, thread_idx_in_pool, core_id.id
                        );
                    }
                    None => {
                        warn!(
                            "Core index {} (pool {}, thread {}) is out of bounds for {} available cores. No affinity set.",
                            global_core_idx,
                            name_for_start_handler,
                            thread_idx_in_pool,
                            available_core_ids.len()
                        );
                    }
                }
            })
            .build()
            .map_err(|e| PartitionError::ThreadingError(format!("Failed to build {} pool: {}", name_str, e)))
    }
}
