//! Read-only lookup contract over the memory store.
//!
//! The gateway only ever holds a shared reference to a [`MemoryStore`].
//! Enumeration and lookups are required; sequence and context views have
//! default implementations derived from [`MemoryStore::node`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::{LifecycleState, MemoryNode, TokenObservation};

/// The three precomputed local-context views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewKind {
    Composition,
    Density,
    Stability,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Composition, ViewKind::Density, ViewKind::Stability];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Composition => "COMPOSITION",
            ViewKind::Density => "DENSITY",
            ViewKind::Stability => "STABILITY",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionView {
    pub node_id: String,
    pub as_of_ts: f64,
    pub total_tokens: usize,
    pub total_volume: f64,
    /// Token count per token type.
    pub token_counts: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DensityView {
    pub node_id: String,
    pub as_of_ts: f64,
    pub token_count: usize,
    pub first_token_ts: Option<f64>,
    pub last_token_ts: Option<f64>,
    /// Seconds since creation.
    pub node_age: f64,
    /// Tokens per hour of node age; 0 for a node created at `as_of_ts`.
    pub tokens_per_hour: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StabilityView {
    pub node_id: String,
    pub as_of_ts: f64,
    pub state: LifecycleState,
    pub transition_count: usize,
    pub seconds_in_state: f64,
    pub seconds_since_interaction: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalContextView {
    Composition(CompositionView),
    Density(DensityView),
    Stability(StabilityView),
}

/// Enumeration filter. Every field narrows the result.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeFilter<'a> {
    pub as_of_ts: f64,
    pub symbol: Option<&'a str>,
    pub states: &'a [LifecycleState],
    /// Inclusive price-center bounds.
    pub price_range: Option<(f64, f64)>,
}

impl NodeFilter<'_> {
    pub fn matches(&self, node: &MemoryNode) -> bool {
        let Some(state) = node.state_at(self.as_of_ts) else {
            return false;
        };
        if !self.states.contains(&state) {
            return false;
        }
        if let Some(symbol) = self.symbol
            && node.symbol != symbol
        {
            return false;
        }
        if let Some((low, high)) = self.price_range
            && (node.price_center < low || node.price_center > high)
        {
            return false;
        }
        true
    }
}

pub trait MemoryStore: Send + Sync {
    fn node(&self, node_id: &str) -> Option<&MemoryNode>;

    /// Nodes matching `filter`, ordered by node id.
    fn nodes_matching(&self, filter: &NodeFilter<'_>) -> Vec<&MemoryNode>;

    fn state_at(&self, node_id: &str, ts: f64) -> Option<LifecycleState> {
        self.node(node_id)?.state_at(ts)
    }

    /// Observations in `(end_ts - lookback, end_ts]` (or everything up to
    /// `end_ts` without a lookback), oldest first, keeping at most the
    /// `max_tokens` most recent.
    fn token_sequence(
        &self,
        node_id: &str,
        end_ts: f64,
        lookback_seconds: Option<f64>,
        max_tokens: Option<usize>,
    ) -> Vec<TokenObservation> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        let window = node.observations_until(end_ts);
        let start = match lookback_seconds {
            Some(lookback) => window.partition_point(|o| o.timestamp <= end_ts - lookback),
            None => 0,
        };
        let window = &window[start..];
        let skip = max_tokens.map_or(0, |max| window.len().saturating_sub(max));
        window[skip..].to_vec()
    }

    fn local_context(&self, node_id: &str, kind: ViewKind, ts: f64) -> Option<LocalContextView> {
        let node = self.node(node_id)?;
        let state = node.state_at(ts)?;
        let observations = node.observations_until(ts);

        let view = match kind {
            ViewKind::Composition => {
                let mut token_counts = BTreeMap::new();
                for o in observations {
                    *token_counts.entry(o.token_type.clone()).or_insert(0) += 1;
                }
                LocalContextView::Composition(CompositionView {
                    node_id: node.node_id.clone(),
                    as_of_ts: ts,
                    total_tokens: observations.len(),
                    total_volume: observations.iter().map(|o| o.volume).sum(),
                    token_counts,
                })
            }
            ViewKind::Density => {
                let node_age = ts - node.creation_ts;
                let tokens_per_hour = if node_age > 0.0 {
                    observations.len() as f64 * 3600.0 / node_age
                } else {
                    0.0
                };
                LocalContextView::Density(DensityView {
                    node_id: node.node_id.clone(),
                    as_of_ts: ts,
                    token_count: observations.len(),
                    first_token_ts: observations.first().map(|o| o.timestamp),
                    last_token_ts: observations.last().map(|o| o.timestamp),
                    node_age,
                    tokens_per_hour,
                })
            }
            ViewKind::Stability => {
                let transitions = node.transitions_until(ts);
                let entered = transitions.last().map_or(node.creation_ts, |t| t.ts);
                LocalContextView::Stability(StabilityView {
                    node_id: node.node_id.clone(),
                    as_of_ts: ts,
                    state,
                    transition_count: transitions.len().saturating_sub(1),
                    seconds_in_state: ts - entered,
                    seconds_since_interaction: node.last_interaction_at(ts).map(|t| ts - t),
                })
            }
        };
        Some(view)
    }
}
