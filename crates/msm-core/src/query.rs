//! Typed queries and the builder that is the only way to obtain one.
//!
//! `QueryBuilder::build` runs guards on the raw parameters, injects neutral
//! defaults, resolves the contract, drops undeclared fields, checks field
//! types, then deserializes into the typed variant and validates it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AccessError, Result};
use crate::guard::{Guard, Params};
use crate::node::LifecycleState;
use crate::schema::{QueryKind, check_fields, retain_declared};
use crate::store::ViewKind;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct IdentityQuery {
    pub(crate) node_id: String,
    pub(crate) current_ts: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct LocalContextQuery {
    pub(crate) node_id: String,
    pub(crate) view_type: ViewKind,
    pub(crate) current_ts: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TemporalSequenceQuery {
    pub(crate) node_id: String,
    pub(crate) query_end_ts: f64,
    #[serde(default)]
    pub(crate) lookback_seconds: Option<f64>,
    #[serde(default)]
    pub(crate) max_tokens: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct SpatialGroupQuery {
    pub(crate) min_price: f64,
    pub(crate) max_price: f64,
    pub(crate) current_ts: f64,
    #[serde(default)]
    pub(crate) symbol: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub(crate) include_dormant: bool,
    /// Explicit state set; overrides `include_dormant` when present.
    #[serde(default)]
    pub(crate) states: Option<Vec<LifecycleState>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct StateDistributionQuery {
    pub(crate) current_ts: f64,
    #[serde(default)]
    pub(crate) symbol: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProximityQuery {
    pub(crate) center_price: f64,
    pub(crate) search_radius: f64,
    pub(crate) current_ts: f64,
    #[serde(default)]
    pub(crate) symbol: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub(crate) include_dormant: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct BoundaryViolationQuery {
    pub(crate) node_id: String,
    pub(crate) boundary_price: f64,
    pub(crate) start_ts: f64,
    pub(crate) end_ts: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConversionFailureQuery {
    pub(crate) node_id: String,
    pub(crate) boundary_price: f64,
    pub(crate) violation_end_ts: f64,
    pub(crate) conversion_window: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TraversalVelocityQuery {
    pub(crate) price_start: f64,
    pub(crate) price_end: f64,
    pub(crate) ts_start: f64,
    pub(crate) ts_end: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TraversalCompactnessQuery {
    pub(crate) prices: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PriceAcceptanceQuery {
    pub(crate) open: f64,
    pub(crate) high: f64,
    pub(crate) low: f64,
    pub(crate) close: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ZonePenetrationQuery {
    pub(crate) zone_low: f64,
    pub(crate) zone_high: f64,
    pub(crate) observed_low: f64,
    pub(crate) observed_high: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct OriginAnchorQuery {
    pub(crate) prices: Vec<f64>,
    pub(crate) timestamps: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct CentralTendencyQuery {
    pub(crate) price: f64,
    pub(crate) central_value: f64,
}

/// Shared by the absence and persistence duration queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PresenceWindowQuery {
    pub(crate) window_start: f64,
    pub(crate) window_end: f64,
    pub(crate) presence_intervals: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct VoidSpanQuery {
    pub(crate) window_start: f64,
    pub(crate) window_end: f64,
    pub(crate) traversal_timestamps: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct NonOccurrenceQuery {
    pub(crate) expected_ids: Vec<String>,
    pub(crate) observed_ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExposureCountQuery {
    pub(crate) exposure_timestamps: Vec<f64>,
    pub(crate) window_start: f64,
    pub(crate) window_end: f64,
}

/// One allowed read. Only [`QueryBuilder::build`] produces a `Query`; its
/// typed request is crate-private, so one cannot be assembled, deserialized,
/// or edited from outside.
///
/// ```compile_fail
/// use msm_core::query::{IdentityQuery, Query, Request};
///
/// let forged = Query {
///     request: Request::Identity(IdentityQuery {
///         node_id: String::new(),
///         current_ts: f64::NAN,
///     }),
/// };
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub(crate) request: Request,
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        self.request.kind()
    }
}

/// Typed payload of a [`Query`], one variant per kind.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Request {
    Identity(IdentityQuery),
    LocalContext(LocalContextQuery),
    TemporalSequence(TemporalSequenceQuery),
    SpatialGroup(SpatialGroupQuery),
    StateDistribution(StateDistributionQuery),
    Proximity(ProximityQuery),
    BoundaryViolation(BoundaryViolationQuery),
    ConversionFailure(ConversionFailureQuery),
    TraversalVelocity(TraversalVelocityQuery),
    TraversalCompactness(TraversalCompactnessQuery),
    PriceAcceptanceRatio(PriceAcceptanceQuery),
    ZonePenetrationDepth(ZonePenetrationQuery),
    DisplacementOriginAnchor(OriginAnchorQuery),
    CentralTendencyDeviation(CentralTendencyQuery),
    StructuralAbsenceDuration(PresenceWindowQuery),
    TraversalVoidSpan(VoidSpanQuery),
    EventNonOccurrence(NonOccurrenceQuery),
    StructuralPersistenceDuration(PresenceWindowQuery),
    StructuralExposureCount(ExposureCountQuery),
}

impl Request {
    fn kind(&self) -> QueryKind {
        match self {
            Request::Identity(_) => QueryKind::Identity,
            Request::LocalContext(_) => QueryKind::LocalContext,
            Request::TemporalSequence(_) => QueryKind::TemporalSequence,
            Request::SpatialGroup(_) => QueryKind::SpatialGroup,
            Request::StateDistribution(_) => QueryKind::StateDistribution,
            Request::Proximity(_) => QueryKind::Proximity,
            Request::BoundaryViolation(_) => QueryKind::BoundaryViolation,
            Request::ConversionFailure(_) => QueryKind::ConversionFailure,
            Request::TraversalVelocity(_) => QueryKind::TraversalVelocity,
            Request::TraversalCompactness(_) => QueryKind::TraversalCompactness,
            Request::PriceAcceptanceRatio(_) => QueryKind::PriceAcceptanceRatio,
            Request::ZonePenetrationDepth(_) => QueryKind::ZonePenetrationDepth,
            Request::DisplacementOriginAnchor(_) => QueryKind::DisplacementOriginAnchor,
            Request::CentralTendencyDeviation(_) => QueryKind::CentralTendencyDeviation,
            Request::StructuralAbsenceDuration(_) => QueryKind::StructuralAbsenceDuration,
            Request::TraversalVoidSpan(_) => QueryKind::TraversalVoidSpan,
            Request::EventNonOccurrence(_) => QueryKind::EventNonOccurrence,
            Request::StructuralPersistenceDuration(_) => QueryKind::StructuralPersistenceDuration,
            Request::StructuralExposureCount(_) => QueryKind::StructuralExposureCount,
        }
    }

    /// Deserialize filtered, type-checked parameters into `kind`'s variant and
    /// run its constructor checks.
    fn construct(kind: QueryKind, params: Params) -> Result<Self> {
        let query = match kind {
            QueryKind::Identity => Request::Identity(typed(params)?),
            QueryKind::LocalContext => Request::LocalContext(typed(params)?),
            QueryKind::TemporalSequence => Request::TemporalSequence(typed(params)?),
            QueryKind::SpatialGroup => Request::SpatialGroup(typed(params)?),
            QueryKind::StateDistribution => Request::StateDistribution(typed(params)?),
            QueryKind::Proximity => Request::Proximity(typed(params)?),
            QueryKind::BoundaryViolation => Request::BoundaryViolation(typed(params)?),
            QueryKind::ConversionFailure => Request::ConversionFailure(typed(params)?),
            QueryKind::TraversalVelocity => Request::TraversalVelocity(typed(params)?),
            QueryKind::TraversalCompactness => Request::TraversalCompactness(typed(params)?),
            QueryKind::PriceAcceptanceRatio => Request::PriceAcceptanceRatio(typed(params)?),
            QueryKind::ZonePenetrationDepth => Request::ZonePenetrationDepth(typed(params)?),
            QueryKind::DisplacementOriginAnchor => {
                Request::DisplacementOriginAnchor(typed(params)?)
            }
            QueryKind::CentralTendencyDeviation => {
                Request::CentralTendencyDeviation(typed(params)?)
            }
            QueryKind::StructuralAbsenceDuration => {
                Request::StructuralAbsenceDuration(typed(params)?)
            }
            QueryKind::TraversalVoidSpan => Request::TraversalVoidSpan(typed(params)?),
            QueryKind::EventNonOccurrence => Request::EventNonOccurrence(typed(params)?),
            QueryKind::StructuralPersistenceDuration => {
                Request::StructuralPersistenceDuration(typed(params)?)
            }
            QueryKind::StructuralExposureCount => Request::StructuralExposureCount(typed(params)?),
        };
        query.validate().map_err(AccessError::SchemaValidation)?;
        Ok(query)
    }

    /// Constructor checks on store-backed queries. Primitive-backed queries
    /// leave numeric validation to the primitive itself.
    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Request::Identity(q) => {
                node_id(&q.node_id)?;
                timestamp("current_ts", q.current_ts)
            }
            Request::LocalContext(q) => {
                node_id(&q.node_id)?;
                timestamp("current_ts", q.current_ts)
            }
            Request::TemporalSequence(q) => {
                node_id(&q.node_id)?;
                timestamp("query_end_ts", q.query_end_ts)?;
                if let Some(lookback) = q.lookback_seconds
                    && !(lookback.is_finite() && lookback > 0.0)
                {
                    return Err(format!("lookback_seconds must be positive, got {lookback}"));
                }
                if let Some(max) = q.max_tokens
                    && max < 0
                {
                    return Err(format!("max_tokens must not be negative, got {max}"));
                }
                Ok(())
            }
            Request::SpatialGroup(q) => {
                timestamp("current_ts", q.current_ts)?;
                price("min_price", q.min_price)?;
                price("max_price", q.max_price)?;
                symbol(q.symbol.as_deref())?;
                if q.min_price > q.max_price {
                    return Err(format!(
                        "min_price {} exceeds max_price {}",
                        q.min_price, q.max_price
                    ));
                }
                Ok(())
            }
            Request::StateDistribution(q) => {
                timestamp("current_ts", q.current_ts)?;
                symbol(q.symbol.as_deref())
            }
            Request::Proximity(q) => {
                timestamp("current_ts", q.current_ts)?;
                price("center_price", q.center_price)?;
                price("search_radius", q.search_radius)?;
                symbol(q.symbol.as_deref())?;
                if q.search_radius < 0.0 {
                    return Err(format!(
                        "search_radius must not be negative, got {}",
                        q.search_radius
                    ));
                }
                Ok(())
            }
            Request::BoundaryViolation(q) => {
                node_id(&q.node_id)?;
                price("boundary_price", q.boundary_price)?;
                timestamp("start_ts", q.start_ts)?;
                timestamp("end_ts", q.end_ts)
            }
            Request::ConversionFailure(q) => {
                node_id(&q.node_id)?;
                price("boundary_price", q.boundary_price)?;
                timestamp("violation_end_ts", q.violation_end_ts)?;
                price("conversion_window", q.conversion_window)
            }
            Request::TraversalVelocity(_)
            | Request::TraversalCompactness(_)
            | Request::PriceAcceptanceRatio(_)
            | Request::ZonePenetrationDepth(_)
            | Request::DisplacementOriginAnchor(_)
            | Request::CentralTendencyDeviation(_)
            | Request::StructuralAbsenceDuration(_)
            | Request::TraversalVoidSpan(_)
            | Request::EventNonOccurrence(_)
            | Request::StructuralPersistenceDuration(_)
            | Request::StructuralExposureCount(_) => Ok(()),
        }
    }
}

fn typed<T: DeserializeOwned>(params: Params) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| AccessError::SchemaValidation(e.to_string()))
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn node_id(id: &str) -> std::result::Result<(), String> {
    if id.trim().is_empty() {
        return Err("node_id must not be empty".to_string());
    }
    Ok(())
}

fn symbol(symbol: Option<&str>) -> std::result::Result<(), String> {
    match symbol {
        Some(s) if s.trim().is_empty() => Err("symbol must not be empty".to_string()),
        _ => Ok(()),
    }
}

fn timestamp(field: &str, ts: f64) -> std::result::Result<(), String> {
    if !ts.is_finite() {
        return Err(format!("{field} must be a finite timestamp, got {ts}"));
    }
    Ok(())
}

fn price(field: &str, value: f64) -> std::result::Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{field} must be finite, got {value}"));
    }
    Ok(())
}

/// Validating builder: raw parameters in, typed [`Query`] or error out.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    guard: Guard,
}

impl QueryBuilder {
    pub fn new(guard: Guard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn build(&self, query_type: &str, raw: &Params) -> Result<Query> {
        self.guard.check(raw)?;
        let params = self.guard.inject_neutral_defaults(raw);
        let kind = QueryKind::resolve(query_type)?;
        let params = retain_declared(kind, params);
        check_fields(kind, &params)?;
        for spec in kind.fields().iter().filter(|f| f.required) {
            if params.get(spec.name).is_none_or(Value::is_null) {
                return Err(AccessError::SchemaValidation(format!(
                    "missing required field '{}' for {}",
                    spec.name,
                    kind.name()
                )));
            }
        }
        let request = Request::construct(kind, params)?;
        Ok(Query { request })
    }
}
