//! JSON snapshot format for a whole memory graph.
//!
//! Wire names are camelCase. Lifecycle states travel as their
//! SCREAMING_SNAKE names.

use serde::{Deserialize, Serialize};

use crate::graph::MemoryGraph;
use crate::node::{LifecycleState, MemoryNode, TokenObservation};

pub const CURRENT_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize, Debug)]
pub struct WireSnapshot {
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<WireNode>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub node_id: String,
    pub symbol: String,
    pub price_center: f64,
    pub creation_ts: f64,
    #[serde(default)]
    pub creation_reason: String,
    /// Empty means active since creation.
    #[serde(default)]
    pub transitions: Vec<WireTransition>,
    #[serde(default)]
    pub observations: Vec<WireObservation>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireTransition {
    pub ts: f64,
    pub state: LifecycleState,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireObservation {
    pub token_type: String,
    pub timestamp: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub duration: f64,
}

impl WireSnapshot {
    pub fn into_graph(self) -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        for wire in self.nodes {
            graph.insert_node(wire_node_to_domain(wire));
        }
        graph
    }

    pub fn from_graph(graph: &MemoryGraph) -> Self {
        WireSnapshot {
            version: CURRENT_VERSION.to_string(),
            nodes: graph.nodes().map(domain_node_to_wire).collect(),
        }
    }
}

fn wire_node_to_domain(wire: WireNode) -> MemoryNode {
    let mut node = MemoryNode::new(
        &wire.node_id,
        &wire.symbol,
        wire.price_center,
        wire.creation_ts,
        &wire.creation_reason,
    );
    if !wire.transitions.is_empty() {
        node.transitions.clear();
        for t in wire.transitions {
            node.push_transition(t.ts, t.state);
        }
    }
    for o in wire.observations {
        node.push_observation(TokenObservation {
            token_type: o.token_type,
            timestamp: o.timestamp,
            volume: o.volume,
            duration: o.duration,
        });
    }
    node
}

fn domain_node_to_wire(node: &MemoryNode) -> WireNode {
    WireNode {
        node_id: node.node_id.clone(),
        symbol: node.symbol.clone(),
        price_center: node.price_center,
        creation_ts: node.creation_ts,
        creation_reason: node.creation_reason.clone(),
        transitions: node
            .transitions
            .iter()
            .map(|t| WireTransition {
                ts: t.ts,
                state: t.state,
            })
            .collect(),
        observations: node
            .observations
            .iter()
            .map(|o| WireObservation {
                token_type: o.token_type.clone(),
                timestamp: o.timestamp,
                volume: o.volume,
                duration: o.duration,
            })
            .collect(),
    }
}

/// Parse a JSON snapshot into a graph.
pub fn import_json(json: &str) -> Result<MemoryGraph, serde_json::Error> {
    let wire: WireSnapshot = serde_json::from_str(json)?;
    Ok(wire.into_graph())
}

/// Serialize a graph as a pretty-printed JSON snapshot.
pub fn export_json(graph: &MemoryGraph) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireSnapshot::from_graph(graph))
}
