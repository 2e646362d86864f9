//! Cluster membership table.
//!
//! Discovery and failure detection belong to an external membership protocol.
//! This table is the view it maintains, and what the partitioner consults to
//! decide which member owns which partition.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::types::{Node, NodeId, NodeState};

pub struct ClusterView {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
}

impl ClusterView {
    pub fn new(local_node: Node) -> Arc<Self> {
        Self::with_members(local_node, Vec::new())
    }

    pub fn with_members(local_node: Node, peers: Vec<Node>) -> Arc<Self> {
        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());
        for peer in peers {
            members.insert(peer.id.clone(), peer);
        }

        Arc::new(Self {
            local_node,
            members,
        })
    }

    /// A single-member cluster, used when the proxy runs embedded in the
    /// process that also stores the data.
    pub fn standalone() -> Arc<Self> {
        Self::new(Node::new(SocketAddr::from(([127, 0, 0, 1], 0))))
    }

    pub fn add_member(&self, node: Node) {
        tracing::info!("Member added: {:?} at {}", node.id, node.http_addr);
        self.members.insert(node.id.clone(), node);
    }

    /// Returns `false` when the member is unknown.
    pub fn mark_dead(&self, node_id: &NodeId) -> bool {
        match self.members.get_mut(node_id) {
            Some(mut member) => {
                member.state = NodeState::Dead;
                tracing::warn!("Member marked dead: {:?}", node_id);
                true
            }
            None => false,
        }
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_member(&self, node_id: &NodeId) -> Option<Node> {
        self.members.get(node_id).map(|entry| entry.value().clone())
    }
}
