//! Load-all coordination.
//!
//! Fans a load request out to every partition owner and folds the outcomes
//! into one: either every partition loaded, or the load failed.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

use super::error::{CacheError, CacheResult};
use super::loader::CompletionListener;
use super::types::Data;
use crate::cluster::protocol::{CacheOperation, OperationResponse};
use crate::cluster::types::{NodeId, PartitionId};
use crate::cluster::{InvocationChannel, PartitionRouter};

/// Keys and partitions sent to one owner. An empty key set asks the owner to
/// load every key its loader knows for those partitions.
struct OwnerBatch {
    member: NodeId,
    partitions: Vec<PartitionId>,
    keys: Vec<Data>,
}

pub struct LoadAllTask {
    cache_name: String,
    /// Fixed when the task is created, so a later membership change does not
    /// reshape a submitted load.
    batches: Vec<OwnerBatch>,
    replace_existing_values: bool,
    listener: Option<Arc<dyn CompletionListener>>,
    channel: Arc<dyn InvocationChannel>,
}

impl LoadAllTask {
    pub fn new(
        cache_name: String,
        keys: Vec<Data>,
        replace_existing_values: bool,
        listener: Option<Arc<dyn CompletionListener>>,
        router: &dyn PartitionRouter,
        channel: Arc<dyn InvocationChannel>,
    ) -> Self {
        Self {
            cache_name,
            batches: owner_batches(&keys, router),
            replace_existing_values,
            listener,
            channel,
        }
    }

    /// Number of owners the load fans out to.
    pub fn owner_count(&self) -> usize {
        self.batches.len()
    }

    /// Runs the load and reports its single outcome to the listener. The same
    /// outcome is returned so the task tracker can surface it on close.
    pub async fn run(self) -> CacheResult<()> {
        let outcome = self.execute().await;
        if let Some(listener) = &self.listener {
            match &outcome {
                Ok(()) => listener.on_completion(),
                Err(e) => listener.on_failure(e.clone()),
            }
        }
        outcome
    }

    async fn execute(&self) -> CacheResult<()> {
        let mut requests = JoinSet::new();

        for batch in &self.batches {
            tracing::debug!(
                "Loading {} key(s) on {} partition(s) of {:?}",
                batch.keys.len(),
                batch.partitions.len(),
                batch.member
            );
            let channel = self.channel.clone();
            let cache_name = self.cache_name.clone();
            let partitions = batch.partitions.clone();
            let owner_keys = batch.keys.clone();
            let replace_existing_values = self.replace_existing_values;
            requests.spawn(async move {
                let factory = move |_: PartitionId| CacheOperation::LoadAll {
                    keys: owner_keys.clone(),
                    replace_existing_values,
                };
                channel
                    .invoke_on_partitions(&cache_name, &factory, &partitions)
                    .await
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = requests.join_next().await {
            let member_results = joined.map_err(CacheError::remote)?;
            results.extend(member_results);
        }

        validate_results(results)
    }
}

/// Groups `keys` by the member owning their partition. Members owning none of
/// the requested keys are left out; with no keys every owner gets a batch.
fn owner_batches(keys: &[Data], router: &dyn PartitionRouter) -> Vec<OwnerBatch> {
    let mut batches = Vec::new();
    for (member, partitions) in router.member_partitions() {
        let owned: HashSet<PartitionId> = partitions.iter().copied().collect();
        let owner_keys: Vec<Data> = keys
            .iter()
            .filter(|key| owned.contains(&router.partition_of(key)))
            .cloned()
            .collect();
        if !keys.is_empty() && owner_keys.is_empty() {
            tracing::debug!("Member {:?} owns none of the keys, skipping", member);
            continue;
        }
        batches.push(OwnerBatch {
            member,
            partitions,
            keys: owner_keys,
        });
    }
    batches
}

/// Fails with the error of the lowest failed partition id, so the reported
/// failure does not depend on completion order.
pub fn validate_results(
    results: impl IntoIterator<Item = (PartitionId, CacheResult<OperationResponse>)>,
) -> CacheResult<()> {
    let ordered: BTreeMap<PartitionId, CacheResult<OperationResponse>> =
        results.into_iter().collect();

    for (partition, result) in ordered {
        if let Err(e) = result {
            return Err(match e {
                CacheError::LoadFailure { .. } => e,
                other => CacheError::LoadFailure {
                    partition,
                    cause: other.to_string(),
                },
            });
        }
    }
    Ok(())
}

/// Deduplicates keys while keeping their first-seen order.
pub fn unique_keys(keys: Vec<Data>) -> Vec<Data> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
