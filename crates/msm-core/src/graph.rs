use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::{LifecycleState, MemoryNode, TokenObservation};
use crate::store::{MemoryStore, NodeFilter};

/// In-memory market-structure memory: nodes keyed by id.
///
/// Mutation happens while the graph is being assembled (import, load from
/// storage). Once handed to the gateway it is only read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryGraph {
    nodes: BTreeMap<String, MemoryNode>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node, returning the previous one.
    pub fn insert_node(&mut self, node: MemoryNode) -> Option<MemoryNode> {
        self.nodes.insert(node.node_id.clone(), node)
    }

    /// Returns false when the node is unknown.
    pub fn record_transition(&mut self, node_id: &str, ts: f64, state: LifecycleState) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.push_transition(ts, state);
                true
            }
            None => false,
        }
    }

    /// Returns false when the node is unknown.
    pub fn record_observation(&mut self, node_id: &str, observation: TokenObservation) -> bool {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.push_observation(observation);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    pub fn observation_count(&self) -> usize {
        self.nodes.values().map(|n| n.observations.len()).sum()
    }
}

impl MemoryStore for MemoryGraph {
    fn node(&self, node_id: &str) -> Option<&MemoryNode> {
        self.nodes.get(node_id)
    }

    fn nodes_matching(&self, filter: &NodeFilter<'_>) -> Vec<&MemoryNode> {
        self.nodes.values().filter(|n| filter.matches(n)).collect()
    }
}
