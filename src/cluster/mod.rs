//! Cluster Access Module
//!
//! The narrow interfaces through which the cache proxy reaches the partitioned
//! cluster, plus the implementations shipped with this crate.
//!
//! ## Core Concepts
//! - **Partition Router**: maps a serialized key to its partition, and reports
//!   which member owns which partitions.
//! - **Invocation Channel**: sends an operation to the owner of a partition and
//!   hands back a single-resolution handle.
//! - **Embedded vs Remote**: `EmbeddedChannel` executes on a store living in the
//!   same process; `HttpChannel` reaches the owner over request/response HTTP.

pub mod embedded;
pub mod http;
pub mod membership;
pub mod partitioner;
pub mod protocol;
pub mod types;


use async_trait::async_trait;
use std::collections::HashMap;

use crate::cache::error::CacheResult;
use crate::cache::future::InvocationHandle;
use crate::cache::types::Data;
use protocol::{CacheOperation, OperationResponse};
use types::{NodeId, PartitionId};

/// Partition ownership table, consulted (never maintained) by the proxy.
pub trait PartitionRouter: Send + Sync {
    fn partition_of(&self, key: &Data) -> PartitionId;

    fn partition_count(&self) -> u32;

    /// Current owner of every partition, grouped by member.
    fn member_partitions(&self) -> HashMap<NodeId, Vec<PartitionId>>;
}

/// Builds the operation sent to each partition of a multi-partition call.
pub trait OperationFactory: Send + Sync {
    fn create(&self, partition: PartitionId) -> CacheOperation;
}

impl<F> OperationFactory for F
where
    F: Fn(PartitionId) -> CacheOperation + Send + Sync,
{
    fn create(&self, partition: PartitionId) -> CacheOperation {
        self(partition)
    }
}

#[async_trait]
pub trait InvocationChannel: Send + Sync {
    /// Issues `operation` to the owner of `partition`. Never blocks; the handle
    /// completes on the channel's own execution context.
    fn invoke(
        &self,
        cache: &str,
        operation: CacheOperation,
        partition: PartitionId,
    ) -> InvocationHandle;

    /// Issues one operation per partition and collects every outcome. A failed
    /// partition does not stop the others.
    async fn invoke_on_partitions(
        &self,
        cache: &str,
        factory: &dyn OperationFactory,
        partitions: &[PartitionId],
    ) -> HashMap<PartitionId, CacheResult<OperationResponse>> {
        let handles: Vec<(PartitionId, InvocationHandle)> = partitions
            .iter()
            .map(|&partition| {
                (
                    partition,
                    self.invoke(cache, factory.create(partition), partition),
                )
            })
            .collect();

        let mut results = HashMap::with_capacity(handles.len());
        for (partition, handle) in handles {
            results.insert(partition, handle.await);
        }
        results
    }
}
