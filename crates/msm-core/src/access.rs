//! The single public read path.
//!
//! [`AccessLayer::execute`] composes, in fixed order: guards on the raw
//! parameters, neutral defaults, contract resolution, type enforcement,
//! construction, dispatch, and output normalization. Every failure is
//! terminal; nothing is retried or cached.

use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::{QueryOutput, dispatch};
use crate::error::{AccessError, Result};
use crate::guard::{Guard, GuardPolicy, Params};
use crate::normalize::Normalizer;
use crate::query::{Query, QueryBuilder};
use crate::schema::QueryKind;
use crate::store::MemoryStore;

/// Outcome of a successful query.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResponse {
    /// Normalized result.
    Computed(Value),
    /// The kind is recognized but has no data wired to its primitive.
    NotWired(QueryKind),
}

impl QueryResponse {
    pub fn is_wired(&self) -> bool {
        matches!(self, QueryResponse::Computed(_))
    }

    /// JSON payload; `null` for a not-wired query.
    pub fn into_json(self) -> Value {
        match self {
            QueryResponse::Computed(value) => value,
            QueryResponse::NotWired(_) => Value::Null,
        }
    }
}

/// Read-only facade over a [`MemoryStore`].
///
/// Holds no mutable state, so one instance can serve concurrent callers.
/// [`execute`](Self::execute) and [`execute_params`](Self::execute_params)
/// are the only ways to reach the store; a built [`Query`] cannot be run
/// directly.
///
/// ```compile_fail
/// use std::sync::Arc;
///
/// use msm_core::{AccessLayer, Guard, GuardPolicy, MemoryGraph, QueryBuilder};
/// use serde_json::json;
///
/// let layer = AccessLayer::new(Arc::new(MemoryGraph::new())).unwrap();
/// let builder = QueryBuilder::new(Guard::new(GuardPolicy::default()).unwrap());
/// let params = json!({"node_id": "n1", "current_ts": 1});
/// let query = builder.build("IDENTITY", params.as_object().unwrap()).unwrap();
/// layer.run(&query).unwrap();
/// ```
pub struct AccessLayer<S: ?Sized> {
    store: Arc<S>,
    builder: QueryBuilder,
    normalizer: Normalizer,
}

impl<S: MemoryStore + ?Sized> AccessLayer<S> {
    /// Facade with the built-in guard tables.
    pub fn new(store: Arc<S>) -> Result<Self> {
        Self::with_policy(store, GuardPolicy::default())
    }

    pub fn with_policy(store: Arc<S>, policy: GuardPolicy) -> Result<Self> {
        let normalizer = Normalizer::new(policy.forbidden_output_fields.clone());
        let builder = QueryBuilder::new(Guard::new(policy)?);
        Ok(Self {
            store,
            builder,
            normalizer,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &GuardPolicy {
        self.builder.guard().policy()
    }

    /// Execute a query from its type name and a JSON object of parameters.
    /// `null` parameters are treated as an empty object.
    pub fn execute(&self, query_type: &str, params: &Value) -> Result<QueryResponse> {
        match params {
            Value::Object(map) => self.execute_params(query_type, map),
            Value::Null => self.execute_params(query_type, &Params::new()),
            other => Err(AccessError::SchemaValidation(format!(
                "parameters must be a JSON object, got {}",
                json_type(other)
            ))),
        }
    }

    pub fn execute_params(&self, query_type: &str, params: &Params) -> Result<QueryResponse> {
        let query = self.builder.build(query_type, params).inspect_err(|e| {
            tracing::debug!(query_type, kind = e.kind(), error = %e, "query rejected");
        })?;
        self.run(&query)
    }

    fn run(&self, query: &Query) -> Result<QueryResponse> {
        let kind = query.kind();
        let output = dispatch(&*self.store, query)?;
        if matches!(output, QueryOutput::NotWired(_)) {
            tracing::debug!(query_type = kind.name(), "query kind not wired");
            return Ok(QueryResponse::NotWired(kind));
        }
        let raw = output.to_json().map_err(|e| unrepresentable_result(kind, e))?;
        let normalized = self.normalizer.normalize(raw, kind.shape())?;
        Ok(QueryResponse::Computed(normalized))
    }
}

/// Output records carry only string map keys, so serialization does not fail
/// in practice; if it ever does, the result is refused as a contract breach.
fn unrepresentable_result(kind: QueryKind, err: serde_json::Error) -> AccessError {
    AccessError::SchemaValidation(format!(
        "result for {} could not be represented as JSON: {err}",
        kind.name()
    ))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::node::{LifecycleState, MemoryNode, TokenObservation};
    use serde_json::json;

    fn layer() -> AccessLayer<MemoryGraph> {
        let mut g = MemoryGraph::new();
        g.insert_node(MemoryNode::new("n1", "BTC-USD", 100.0, 1000.0, "pivot_high"));
        g.insert_node(MemoryNode::new("n2", "BTC-USD", 98.0, 1000.0, "sweep"));
        g.record_transition("n2", 1500.0, LifecycleState::Dormant);
        for ts in [1300.0, 1100.0, 1200.0] {
            g.record_observation(
                "n1",
                TokenObservation {
                    token_type: "TRADE".into(),
                    timestamp: ts,
                    volume: 1.0,
                    duration: 0.0,
                },
            );
        }
        AccessLayer::new(Arc::new(g)).unwrap()
    }

    #[test]
    fn test_identity_end_to_end() {
        let out = layer()
            .execute("IDENTITY", &json!({"node_id": "n1", "current_ts": 2000}))
            .unwrap()
            .into_json();
        assert_eq!(out["state"], json!("ACTIVE"));
        assert_eq!(out["price_center"], json!(100.0));
    }

    #[test]
    fn test_temporal_sequence_is_time_ordered() {
        let out = layer()
            .execute(
                "TEMPORAL_SEQUENCE",
                &json!({"node_id": "n1", "query_end_ts": 2000}),
            )
            .unwrap()
            .into_json();
        let ts: Vec<f64> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["timestamp"].as_f64().unwrap())
            .collect();
        assert_eq!(ts, vec![1100.0, 1200.0, 1300.0]);
    }

    #[test]
    fn test_unknown_type_is_denied() {
        let err = layer().execute("TRADE_IDEA", &json!({})).unwrap_err();
        assert_eq!(err.kind(), "ACCESS_DENIED");
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = layer().execute("IDENTITY", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, AccessError::SchemaValidation(msg) if msg.contains("array")));
    }

    #[test]
    fn test_null_params_reach_contract_check() {
        let err = layer().execute("IDENTITY", &Value::Null).unwrap_err();
        assert_eq!(err.kind(), "SCHEMA_VALIDATION");
    }

    #[test]
    fn test_guard_runs_before_resolution() {
        let err = layer()
            .execute("NOT_A_KIND", &json!({"signal": 1}))
            .unwrap_err();
        assert_eq!(err.kind(), "EPISTEMIC_SAFETY");
    }

    #[test]
    fn test_implicit_time_is_a_determinism_error() {
        let err = layer()
            .execute("IDENTITY", &json!({"node_id": "n1", "current_ts": "now"}))
            .unwrap_err();
        assert_eq!(err.kind(), "DETERMINISM");
    }

    #[test]
    fn test_not_wired_is_distinct_from_empty() {
        let resp = layer()
            .execute(
                "CONVERSION_FAILURE",
                &json!({
                    "node_id": "n1",
                    "boundary_price": 100.0,
                    "violation_end_ts": 1500,
                    "conversion_window": 60
                }),
            )
            .unwrap();
        assert_eq!(resp, QueryResponse::NotWired(QueryKind::ConversionFailure));
        assert!(!resp.is_wired());
        assert_eq!(resp.into_json(), Value::Null);
    }

    #[test]
    fn test_custom_output_policy_refuses_result() {
        let mut policy = GuardPolicy::default();
        policy.forbidden_output_fields.insert("velocity".into());
        let layer = AccessLayer::with_policy(Arc::new(MemoryGraph::new()), policy).unwrap();
        let err = layer
            .execute(
                "TRAVERSAL_VELOCITY",
                &json!({"price_start": 1, "price_end": 2, "ts_start": 0, "ts_end": 10}),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "EPISTEMIC_SAFETY");
    }

    #[test]
    fn test_tainted_spatial_params_refused_at_entry() {
        let err = layer()
            .execute(
                "SPATIAL_GROUP",
                &json!({
                    "min_price": 110,
                    "max_price": 90,
                    "current_ts": 2000,
                    "symbol": "STRONG_BUY"
                }),
            )
            .unwrap_err();
        assert_eq!(
            err,
            AccessError::EpistemicSafety(
                "parameter 'symbol' contains forbidden pattern 'STRONG_'".into()
            )
        );
    }

    #[test]
    fn test_inverted_range_refused_before_dispatch() {
        let err = layer()
            .execute(
                "SPATIAL_GROUP",
                &json!({"min_price": 110, "max_price": 90, "current_ts": 2000}),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "SCHEMA_VALIDATION");
    }

    #[test]
    fn test_empty_node_id_refused_before_dispatch() {
        let err = layer()
            .execute("IDENTITY", &json!({"node_id": "", "current_ts": 2000}))
            .unwrap_err();
        assert_eq!(err.kind(), "SCHEMA_VALIDATION");
    }

    #[test]
    fn test_unrepresentable_result_is_schema_validation() {
        let cause = serde_json::from_str::<Value>("{").unwrap_err();
        let err = unrepresentable_result(QueryKind::Proximity, cause);
        assert_eq!(err.kind(), "SCHEMA_VALIDATION");
        assert!(err.to_string().contains("PROXIMITY"));
    }

    #[test]
    fn test_facade_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AccessLayer<MemoryGraph>>();
        assert_send_sync::<AccessLayer<dyn MemoryStore>>();
    }
}
