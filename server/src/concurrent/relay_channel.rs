// map_partition_engine/server/src/concurrent/relay_channel.rs
use crate::core::config::RelayOverflowPolicy;
use crate::core::error::{PartitionError, PartitionResult};
use crate::core::types::PartitionId;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;

/// One relay kind's queues, one independently locked shard per partition.
///
/// Partition ids are 1-based; partition 0 never owns a queue. Producers only
/// hold a shard lock for a push, and consumers only for the swap in
/// [`PartitionRelayChannel::drain`], so relay processing never runs under a
/// queue lock.
pub struct PartitionRelayChannel<T> {
    kind: &'static str,
    shards: Box<[CachePadded<Mutex<Vec<T>>>]>,
    limit: usize,
    policy: RelayOverflowPolicy,
}

impl<T> PartitionRelayChannel<T> {
    pub fn new(kind: &'static str, partition_count: u32, limit: usize, policy: RelayOverflowPolicy) -> Self {
        let shards = (0..partition_count)
            .map(|_| CachePadded::new(Mutex::new(Vec::new())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        PartitionRelayChannel { kind, shards, limit: limit.max(1), policy }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    #[inline]
    pub fn partition_count(&self) -> u32 {
        self.shards.len() as u32
    }

    fn shard(&self, partition_id: PartitionId) -> PartitionResult<&Mutex<Vec<T>>> {
        partition_id
            .checked_sub(1)
            .and_then(|index| self.shards.get(index as usize))
            .map(|shard| &**shard)
            .ok_or(PartitionError::InvalidPartition {
                partition: partition_id,
                count: self.partition_count(),
            })
    }

    /// Appends `item` to the partition's queue and returns the new depth.
    pub fn push(&self, partition_id: PartitionId, item: T) -> PartitionResult<usize> {
        let shard = self.shard(partition_id)?;
        let mut queue = shard.lock();
        if self.policy == RelayOverflowPolicy::Drop && queue.len() >= self.limit {
            return Err(PartitionError::RelayQueueFull {
                kind: self.kind,
                partition: partition_id,
                limit: self.limit,
            });
        }
        queue.push(item);
        Ok(queue.len())
    }

    /// Swaps the partition's queue out and returns it in enqueue order.
    pub fn drain(&self, partition_id: PartitionId) -> Vec<T> {
        let Ok(shard) = self.shard(partition_id) else {
            return Vec::new();
        };
        let mut local = Vec::new();
        let mut queue = shard.lock();
        std::mem::swap(&mut local, &mut *queue);
        queue.reserve(local.len().min(self.limit));
        local
    }

    pub fn len(&self, partition_id: PartitionId) -> usize {
        self.shard(partition_id).map(|shard| shard.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self, partition_id: PartitionId) -> bool {
        self.len(partition_id) == 0
    }

    pub fn total_len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }
}
