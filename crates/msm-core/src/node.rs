use serde::{Deserialize, Serialize};

/// Lifecycle of a memory node. Order is declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Active,
    Dormant,
    Archived,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 3] = [
        LifecycleState::Active,
        LifecycleState::Dormant,
        LifecycleState::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Dormant => "DORMANT",
            LifecycleState::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub ts: f64,
    pub state: LifecycleState,
}

/// One observed token at a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenObservation {
    pub token_type: String,
    pub timestamp: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub duration: f64,
}

/// A price-anchored memory node with its full lifecycle and observation history.
///
/// Transitions and observations are kept sorted by timestamp; every
/// "as of" read only looks at entries at or before the requested time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub node_id: String,
    pub symbol: String,
    pub price_center: f64,
    pub creation_ts: f64,
    pub creation_reason: String,
    pub transitions: Vec<StateTransition>,
    pub observations: Vec<TokenObservation>,
}

impl MemoryNode {
    /// New node, active from `creation_ts`.
    pub fn new(
        node_id: &str,
        symbol: &str,
        price_center: f64,
        creation_ts: f64,
        creation_reason: &str,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            symbol: symbol.to_string(),
            price_center,
            creation_ts,
            creation_reason: creation_reason.to_string(),
            transitions: vec![StateTransition {
                ts: creation_ts,
                state: LifecycleState::Active,
            }],
            observations: Vec::new(),
        }
    }

    /// Insert a transition keeping timestamp order. Equal timestamps keep
    /// insertion order, so the later call wins in `state_at`.
    pub fn push_transition(&mut self, ts: f64, state: LifecycleState) {
        let idx = self.transitions.partition_point(|t| t.ts <= ts);
        self.transitions.insert(idx, StateTransition { ts, state });
    }

    pub fn push_observation(&mut self, observation: TokenObservation) {
        let idx = self
            .observations
            .partition_point(|o| o.timestamp <= observation.timestamp);
        self.observations.insert(idx, observation);
    }

    /// Whether the node exists at `ts`.
    pub fn exists_at(&self, ts: f64) -> bool {
        self.creation_ts <= ts
    }

    /// Lifecycle state at `ts`; `None` before creation.
    pub fn state_at(&self, ts: f64) -> Option<LifecycleState> {
        if !self.exists_at(ts) {
            return None;
        }
        self.transitions
            .iter()
            .take_while(|t| t.ts <= ts)
            .last()
            .map(|t| t.state)
            .or(Some(LifecycleState::Active))
    }

    /// Observations at or before `ts`, oldest first.
    pub fn observations_until(&self, ts: f64) -> &[TokenObservation] {
        let end = self.observations.partition_point(|o| o.timestamp <= ts);
        &self.observations[..end]
    }

    /// Transitions at or before `ts`, oldest first.
    pub fn transitions_until(&self, ts: f64) -> &[StateTransition] {
        let end = self.transitions.partition_point(|t| t.ts <= ts);
        &self.transitions[..end]
    }

    /// Timestamp of the most recent observation at or before `ts`.
    pub fn last_interaction_at(&self, ts: f64) -> Option<f64> {
        self.observations_until(ts).last().map(|o| o.timestamp)
    }

    /// Most recent change of any kind (creation, transition, observation) at
    /// or before `ts`.
    pub fn last_update_at(&self, ts: f64) -> Option<f64> {
        if !self.exists_at(ts) {
            return None;
        }
        let transition = self.transitions_until(ts).last().map(|t| t.ts);
        let observation = self.last_interaction_at(ts);
        [Some(self.creation_ts), transition, observation]
            .into_iter()
            .flatten()
            .reduce(f64::max)
    }
}
