use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::PartitionRouter;
use super::membership::ClusterView;
use super::types::{NodeId, PartitionId};
use crate::cache::types::Data;

pub const DEFAULT_PARTITION_COUNT: u32 = 256;

/// Maps serialized keys to partitions and partitions to their owning member.
///
/// Ownership is derived from the sorted list of alive members, so every member
/// holding the same membership view computes the same table.
pub struct PartitionManager {
    num_partitions: u32,
    membership: Arc<ClusterView>,
}

impl PartitionManager {
    pub fn new(membership: Arc<ClusterView>) -> Arc<Self> {
        Self::with_partition_count(membership, DEFAULT_PARTITION_COUNT)
    }

    pub fn with_partition_count(membership: Arc<ClusterView>, num_partitions: u32) -> Arc<Self> {
        Arc::new(Self {
            num_partitions: num_partitions.max(1),
            membership,
        })
    }

    pub fn get_partition(&self, key: &[u8]) -> PartitionId {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_partitions
    }

    fn sorted_alive_ids(&self) -> Vec<NodeId> {
        let mut node_ids: Vec<NodeId> = self
            .membership
            .get_alive_members()
            .into_iter()
            .map(|node| node.id)
            .collect();
        node_ids.sort();
        node_ids
    }

    pub fn get_owner(&self, partition: PartitionId) -> Option<NodeId> {
        let node_ids = self.sorted_alive_ids();
        if node_ids.is_empty() {
            return None;
        }
        let idx = (partition as usize) % node_ids.len();
        Some(node_ids[idx].clone())
    }

    pub fn my_partitions(&self) -> Vec<PartitionId> {
        let my_id = &self.membership.local_node.id;
        self.member_partitions().remove(my_id).unwrap_or_default()
    }
}

impl PartitionRouter for PartitionManager {
    fn partition_of(&self, key: &Data) -> PartitionId {
        self.get_partition(key.as_bytes())
    }

    fn partition_count(&self) -> u32 {
        self.num_partitions
    }

    fn member_partitions(&self) -> HashMap<NodeId, Vec<PartitionId>> {
        let node_ids = self.sorted_alive_ids();
        let mut owned: HashMap<NodeId, Vec<PartitionId>> = HashMap::new();
        if node_ids.is_empty() {
            return owned;
        }

        for partition in 0..self.num_partitions {
            let owner = &node_ids[(partition as usize) % node_ids.len()];
            owned.entry(owner.clone()).or_default().push(partition);
        }
        owned
    }
}
