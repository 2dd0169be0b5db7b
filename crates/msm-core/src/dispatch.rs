use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::node::{LifecycleState, TokenObservation};
use crate::primitives::{self as prim, *};
use crate::query::{Query, Request};
use crate::schema::QueryKind;
use crate::store::{LocalContextView, MemoryStore, NodeFilter};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub node_id: String,
    pub state: LifecycleState,
    pub creation_ts: f64,
    pub last_update_ts: f64,
    pub price_center: f64,
    pub creation_reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialEntry {
    pub node_id: String,
    pub price: f64,
    pub state: LifecycleState,
    pub distance_from_min: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelativePosition {
    Above,
    Below,
    At,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximityEntry {
    pub node_id: String,
    pub price: f64,
    pub distance: f64,
    pub direction: RelativePosition,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDistribution {
    #[serde(rename = "ACTIVE")]
    pub active: usize,
    #[serde(rename = "DORMANT")]
    pub dormant: usize,
    #[serde(rename = "ARCHIVED")]
    pub archived: usize,
    pub total_count: usize,
}

/// Typed result of dispatching one query.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum QueryOutput {
    Identity(Option<IdentityRecord>),
    LocalContext(Option<LocalContextView>),
    TemporalSequence(Vec<TokenObservation>),
    SpatialGroup(Vec<SpatialEntry>),
    StateDistribution(StateDistribution),
    Proximity(Vec<ProximityEntry>),
    TraversalVelocity(TraversalVelocity),
    TraversalCompactness(TraversalCompactness),
    PriceAcceptance(PriceAcceptance),
    ZonePenetration(ZonePenetration),
    DisplacementOriginAnchor(DisplacementOriginAnchor),
    CentralTendencyDeviation(CentralTendencyDeviation),
    StructuralAbsence(StructuralAbsence),
    TraversalVoidSpan(TraversalVoidSpan),
    EventNonOccurrence(EventNonOccurrence),
    StructuralPersistence(StructuralPersistence),
    StructuralExposure(StructuralExposure),
    /// The query kind has no store-side data wired to its primitive.
    NotWired(QueryKind),
}

impl QueryOutput {
    /// Serialized form. `NotWired` serializes as `null`.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        match self {
            QueryOutput::Identity(r) => serde_json::to_value(r),
            QueryOutput::LocalContext(r) => serde_json::to_value(r),
            QueryOutput::TemporalSequence(r) => serde_json::to_value(r),
            QueryOutput::SpatialGroup(r) => serde_json::to_value(r),
            QueryOutput::StateDistribution(r) => serde_json::to_value(r),
            QueryOutput::Proximity(r) => serde_json::to_value(r),
            QueryOutput::TraversalVelocity(r) => serde_json::to_value(r),
            QueryOutput::TraversalCompactness(r) => serde_json::to_value(r),
            QueryOutput::PriceAcceptance(r) => serde_json::to_value(r),
            QueryOutput::ZonePenetration(r) => serde_json::to_value(r),
            QueryOutput::DisplacementOriginAnchor(r) => serde_json::to_value(r),
            QueryOutput::CentralTendencyDeviation(r) => serde_json::to_value(r),
            QueryOutput::StructuralAbsence(r) => serde_json::to_value(r),
            QueryOutput::TraversalVoidSpan(r) => serde_json::to_value(r),
            QueryOutput::EventNonOccurrence(r) => serde_json::to_value(r),
            QueryOutput::StructuralPersistence(r) => serde_json::to_value(r),
            QueryOutput::StructuralExposure(r) => serde_json::to_value(r),
            QueryOutput::NotWired(_) => Ok(Value::Null),
        }
    }
}

fn visible_states(include_dormant: bool) -> &'static [LifecycleState] {
    if include_dormant {
        &[LifecycleState::Active, LifecycleState::Dormant]
    } else {
        &[LifecycleState::Active]
    }
}

/// Route a validated query to exactly one store lookup or one primitive.
pub(crate) fn dispatch<S: MemoryStore + ?Sized>(store: &S, query: &Query) -> Result<QueryOutput> {
    let output = match &query.request {
        Request::Identity(q) => {
            let record = store.node(&q.node_id).and_then(|node| {
                Some(IdentityRecord {
                    node_id: node.node_id.clone(),
                    state: node.state_at(q.current_ts)?,
                    creation_ts: node.creation_ts,
                    last_update_ts: node.last_update_at(q.current_ts)?,
                    price_center: node.price_center,
                    creation_reason: node.creation_reason.clone(),
                })
            });
            QueryOutput::Identity(record)
        }
        Request::LocalContext(q) => {
            QueryOutput::LocalContext(store.local_context(&q.node_id, q.view_type, q.current_ts))
        }
        Request::TemporalSequence(q) => QueryOutput::TemporalSequence(store.token_sequence(
            &q.node_id,
            q.query_end_ts,
            q.lookback_seconds,
            q.max_tokens.map(|m| m.max(0) as usize),
        )),
        Request::SpatialGroup(q) => {
            let states = match &q.states {
                Some(states) => states.as_slice(),
                None => visible_states(q.include_dormant),
            };
            let filter = NodeFilter {
                as_of_ts: q.current_ts,
                symbol: q.symbol.as_deref(),
                states,
                price_range: Some((q.min_price, q.max_price)),
            };
            let entries = store
                .nodes_matching(&filter)
                .into_iter()
                .filter_map(|node| {
                    Some(SpatialEntry {
                        node_id: node.node_id.clone(),
                        price: node.price_center,
                        state: node.state_at(q.current_ts)?,
                        distance_from_min: node.price_center - q.min_price,
                    })
                })
                .collect();
            QueryOutput::SpatialGroup(entries)
        }
        Request::StateDistribution(q) => {
            let filter = NodeFilter {
                as_of_ts: q.current_ts,
                symbol: q.symbol.as_deref(),
                states: &LifecycleState::ALL,
                price_range: None,
            };
            let mut dist = StateDistribution::default();
            for node in store.nodes_matching(&filter) {
                match node.state_at(q.current_ts) {
                    Some(LifecycleState::Active) => dist.active += 1,
                    Some(LifecycleState::Dormant) => dist.dormant += 1,
                    Some(LifecycleState::Archived) => dist.archived += 1,
                    None => continue,
                }
                dist.total_count += 1;
            }
            QueryOutput::StateDistribution(dist)
        }
        Request::Proximity(q) => {
            let filter = NodeFilter {
                as_of_ts: q.current_ts,
                symbol: q.symbol.as_deref(),
                states: visible_states(q.include_dormant),
                price_range: Some((
                    q.center_price - q.search_radius,
                    q.center_price + q.search_radius,
                )),
            };
            let entries = store
                .nodes_matching(&filter)
                .into_iter()
                .map(|node| {
                    let offset = node.price_center - q.center_price;
                    let direction = if offset > 0.0 {
                        RelativePosition::Above
                    } else if offset < 0.0 {
                        RelativePosition::Below
                    } else {
                        RelativePosition::At
                    };
                    ProximityEntry {
                        node_id: node.node_id.clone(),
                        price: node.price_center,
                        distance: offset.abs(),
                        direction,
                    }
                })
                .collect();
            QueryOutput::Proximity(entries)
        }
        // No traversal history is exposed by the store for these yet; the
        // primitives exist but have nothing to run on.
        Request::BoundaryViolation(_) => QueryOutput::NotWired(QueryKind::BoundaryViolation),
        Request::ConversionFailure(_) => QueryOutput::NotWired(QueryKind::ConversionFailure),
        Request::TraversalVelocity(q) => QueryOutput::TraversalVelocity(
            prim::compute_traversal_velocity(q.price_start, q.price_end, q.ts_start, q.ts_end)?,
        ),
        Request::TraversalCompactness(q) => {
            QueryOutput::TraversalCompactness(prim::compute_traversal_compactness(&q.prices)?)
        }
        Request::PriceAcceptanceRatio(q) => QueryOutput::PriceAcceptance(
            prim::compute_price_acceptance_ratio(q.open, q.high, q.low, q.close)?,
        ),
        Request::ZonePenetrationDepth(q) => {
            QueryOutput::ZonePenetration(prim::compute_zone_penetration_depth(
                q.zone_low,
                q.zone_high,
                q.observed_low,
                q.observed_high,
            )?)
        }
        Request::DisplacementOriginAnchor(q) => QueryOutput::DisplacementOriginAnchor(
            prim::compute_displacement_origin_anchor(&q.prices, &q.timestamps)?,
        ),
        Request::CentralTendencyDeviation(q) => QueryOutput::CentralTendencyDeviation(
            prim::compute_central_tendency_deviation(q.price, q.central_value)?,
        ),
        Request::StructuralAbsenceDuration(q) => {
            QueryOutput::StructuralAbsence(prim::compute_structural_absence_duration(
                q.window_start,
                q.window_end,
                &q.presence_intervals,
            )?)
        }
        Request::TraversalVoidSpan(q) => {
            QueryOutput::TraversalVoidSpan(prim::compute_traversal_void_span(
                q.window_start,
                q.window_end,
                &q.traversal_timestamps,
            )?)
        }
        Request::EventNonOccurrence(q) => QueryOutput::EventNonOccurrence(
            prim::compute_event_non_occurrence(&q.expected_ids, &q.observed_ids)?,
        ),
        Request::StructuralPersistenceDuration(q) => {
            QueryOutput::StructuralPersistence(prim::compute_structural_persistence_duration(
                q.window_start,
                q.window_end,
                &q.presence_intervals,
            )?)
        }
        Request::StructuralExposureCount(q) => {
            QueryOutput::StructuralExposure(prim::compute_structural_exposure_count(
                &q.exposure_timestamps,
                q.window_start,
                q.window_end,
            )?)
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AccessError, PrimitiveError};
    use crate::graph::MemoryGraph;
    use crate::guard::{Guard, GuardPolicy};
    use crate::node::MemoryNode;
    use crate::query::QueryBuilder;
    use serde_json::json;

    fn graph() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        g.insert_node(MemoryNode::new("n1", "BTC-USD", 100.0, 1000.0, "pivot_high"));
        g.insert_node(MemoryNode::new("n2", "BTC-USD", 96.0, 1000.0, "sweep"));
        g.insert_node(MemoryNode::new("n3", "BTC-USD", 104.0, 1000.0, "pivot_low"));
        g.insert_node(MemoryNode::new("n4", "ETH-USD", 101.0, 1000.0, "pivot_low"));
        g.record_transition("n3", 1500.0, LifecycleState::Dormant);
        g.record_transition("n4", 1500.0, LifecycleState::Archived);
        g
    }

    fn query(query_type: &str, params: Value) -> Query {
        QueryBuilder::new(Guard::new(GuardPolicy::default()).unwrap())
            .build(query_type, params.as_object().unwrap())
            .unwrap()
    }

    fn run(query_type: &str, params: Value) -> Result<QueryOutput> {
        dispatch(&graph(), &query(query_type, params))
    }

    #[test]
    fn test_identity_reads_node_as_of_timestamp() {
        let out = run("IDENTITY", json!({"node_id": "n3", "current_ts": 2000})).unwrap();
        let QueryOutput::Identity(Some(r)) = out else {
            panic!("expected identity record");
        };
        assert_eq!(r.state, LifecycleState::Dormant);
        assert_eq!(r.last_update_ts, 1500.0);
        assert_eq!(r.creation_reason, "pivot_low");
    }

    #[test]
    fn test_identity_of_unknown_node_is_empty() {
        let out = run("IDENTITY", json!({"node_id": "zz", "current_ts": 2000})).unwrap();
        assert_eq!(out, QueryOutput::Identity(None));
    }

    #[test]
    fn test_state_distribution_counts_all_states() {
        let out = run("STATE_DISTRIBUTION", json!({"current_ts": 2000})).unwrap();
        let QueryOutput::StateDistribution(d) = out else {
            panic!("expected distribution");
        };
        assert_eq!(
            d,
            StateDistribution {
                active: 2,
                dormant: 1,
                archived: 1,
                total_count: 4
            }
        );
    }

    #[test]
    fn test_spatial_group_honors_include_dormant() {
        let mut params = json!({
            "min_price": 95.0,
            "max_price": 105.0,
            "current_ts": 2000,
            "symbol": "BTC-USD"
        });
        let QueryOutput::SpatialGroup(active) = run("SPATIAL_GROUP", params.clone()).unwrap()
        else {
            panic!("expected spatial group");
        };
        assert_eq!(active.len(), 2);

        params["include_dormant"] = json!(true);
        let QueryOutput::SpatialGroup(all) = run("SPATIAL_GROUP", params).unwrap() else {
            panic!("expected spatial group");
        };
        assert_eq!(all.len(), 3);
        let n2 = all.iter().find(|e| e.node_id == "n2").unwrap();
        assert_eq!(n2.distance_from_min, 1.0);
    }

    #[test]
    fn test_proximity_reports_distance_and_side() {
        let out = run(
            "PROXIMITY",
            json!({"center_price": 99.0, "search_radius": 5.0, "current_ts": 2000}),
        )
        .unwrap();
        let QueryOutput::Proximity(entries) = out else {
            panic!("expected proximity");
        };
        let ids: Vec<&str> = entries.iter().map(|e| e.node_id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert_eq!(entries[0].direction, RelativePosition::Above);
        assert_eq!(entries[1].distance, 3.0);
    }

    #[test]
    fn test_unwired_queries_are_flagged() {
        let out = run(
            "BOUNDARY_VIOLATION",
            json!({"node_id": "n1", "boundary_price": 100.0, "start_ts": 1000, "end_ts": 2000}),
        )
        .unwrap();
        assert_eq!(out, QueryOutput::NotWired(QueryKind::BoundaryViolation));
        assert_eq!(out.to_json().unwrap(), Value::Null);
    }

    #[test]
    fn test_primitive_errors_surface_as_invalid_input() {
        let err = run(
            "STRUCTURAL_EXPOSURE_COUNT",
            json!({"exposure_timestamps": [1200.0], "window_start": 1000, "window_end": 1100}),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AccessError::InvalidInput(PrimitiveError::OutsideWindow { .. })
        ));
    }
}
