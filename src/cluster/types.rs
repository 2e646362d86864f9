use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Index of a fixed-size shard of the key space.
pub type PartitionId = u32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identity derived from the node's address, so that every member built
    /// from the same address list agrees on the ids.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Dead,
}

/// A single member in the cluster.
///
/// `http_addr` is where the member accepts cache invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub http_addr: SocketAddr,
    pub state: NodeState,
}

impl Node {
    pub fn new(http_addr: SocketAddr) -> Self {
        Self {
            id: NodeId::from_addr(http_addr),
            http_addr,
            state: NodeState::Alive,
        }
    }
}
