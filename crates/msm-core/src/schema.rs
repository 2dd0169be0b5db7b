//! Closed set of query kinds and their declared field contracts.
//!
//! The contract drives two steps of query construction: undeclared fields
//! are dropped, and declared fields are type-checked so a failure names the
//! offending field. The typed query structs in [`crate::query`] are the
//! final gate.

use serde_json::{Value, json};

use crate::error::{AccessError, Result};
use crate::guard::Params;
use crate::node::LifecycleState;
use crate::store::ViewKind;

/// Field types a query contract can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Any JSON number.
    Float,
    /// Integral JSON number.
    Int,
    Bool,
    Str,
    FloatList,
    StrList,
    /// List of `[start, end]` numeric pairs.
    IntervalList,
    View,
    StateList,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Float => "float",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Str => "str",
            FieldType::FloatList => "list[float]",
            FieldType::StrList => "list[str]",
            FieldType::IntervalList => "list[[float, float]]",
            FieldType::View => "ViewKind",
            FieldType::StateList => "list[LifecycleState]",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

const fn req(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: true,
    }
}

const fn opt(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: false,
    }
}

use FieldType::{Bool, Float, FloatList, Int, IntervalList, StateList, Str, StrList, View};

const IDENTITY_FIELDS: &[FieldSpec] = &[req("node_id", Str), req("current_ts", Float)];
const LOCAL_CONTEXT_FIELDS: &[FieldSpec] = &[
    req("node_id", Str),
    req("view_type", View),
    req("current_ts", Float),
];
const TEMPORAL_SEQUENCE_FIELDS: &[FieldSpec] = &[
    req("node_id", Str),
    req("query_end_ts", Float),
    opt("lookback_seconds", Float),
    opt("max_tokens", Int),
];
const SPATIAL_GROUP_FIELDS: &[FieldSpec] = &[
    req("min_price", Float),
    req("max_price", Float),
    req("current_ts", Float),
    opt("symbol", Str),
    opt("include_dormant", Bool),
    opt("states", StateList),
];
const STATE_DISTRIBUTION_FIELDS: &[FieldSpec] = &[req("current_ts", Float), opt("symbol", Str)];
const PROXIMITY_FIELDS: &[FieldSpec] = &[
    req("center_price", Float),
    req("search_radius", Float),
    req("current_ts", Float),
    opt("symbol", Str),
    opt("include_dormant", Bool),
];
const BOUNDARY_VIOLATION_FIELDS: &[FieldSpec] = &[
    req("node_id", Str),
    req("boundary_price", Float),
    req("start_ts", Float),
    req("end_ts", Float),
];
const CONVERSION_FAILURE_FIELDS: &[FieldSpec] = &[
    req("node_id", Str),
    req("boundary_price", Float),
    req("violation_end_ts", Float),
    req("conversion_window", Float),
];
const TRAVERSAL_VELOCITY_FIELDS: &[FieldSpec] = &[
    req("price_start", Float),
    req("price_end", Float),
    req("ts_start", Float),
    req("ts_end", Float),
];
const TRAVERSAL_COMPACTNESS_FIELDS: &[FieldSpec] = &[req("prices", FloatList)];
const PRICE_ACCEPTANCE_RATIO_FIELDS: &[FieldSpec] = &[
    req("open", Float),
    req("high", Float),
    req("low", Float),
    req("close", Float),
];
const ZONE_PENETRATION_DEPTH_FIELDS: &[FieldSpec] = &[
    req("zone_low", Float),
    req("zone_high", Float),
    req("observed_low", Float),
    req("observed_high", Float),
];
const DISPLACEMENT_ORIGIN_ANCHOR_FIELDS: &[FieldSpec] = &[
    req("prices", FloatList),
    req("timestamps", FloatList),
];
const CENTRAL_TENDENCY_DEVIATION_FIELDS: &[FieldSpec] = &[
    req("price", Float),
    req("central_value", Float),
];
const PRESENCE_WINDOW_FIELDS: &[FieldSpec] = &[
    req("window_start", Float),
    req("window_end", Float),
    req("presence_intervals", IntervalList),
];
const TRAVERSAL_VOID_SPAN_FIELDS: &[FieldSpec] = &[
    req("window_start", Float),
    req("window_end", Float),
    req("traversal_timestamps", FloatList),
];
const EVENT_NON_OCCURRENCE_FIELDS: &[FieldSpec] = &[
    req("expected_ids", StrList),
    req("observed_ids", StrList),
];
const STRUCTURAL_EXPOSURE_COUNT_FIELDS: &[FieldSpec] = &[
    req("exposure_timestamps", FloatList),
    req("window_start", Float),
    req("window_end", Float),
];

/// How the normalizer orders a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultShape {
    /// List ordered by ascending `timestamp`.
    Temporal,
    /// List ordered by ascending `price`.
    Spatial,
    /// List ordered by ascending `distance`.
    Proximity,
    /// Single record, scanned but not reordered.
    Single,
}

macro_rules! query_kinds {
    ($($variant:ident => $name:literal,)+) => {
        /// Every query the gateway accepts.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum QueryKind {
            $($variant,)+
        }

        impl QueryKind {
            pub const ALL: &'static [QueryKind] = &[$(QueryKind::$variant,)+];

            pub fn name(self) -> &'static str {
                match self {
                    $(QueryKind::$variant => $name,)+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(QueryKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

query_kinds! {
    Identity => "IDENTITY",
    LocalContext => "LOCAL_CONTEXT",
    TemporalSequence => "TEMPORAL_SEQUENCE",
    SpatialGroup => "SPATIAL_GROUP",
    StateDistribution => "STATE_DISTRIBUTION",
    Proximity => "PROXIMITY",
    BoundaryViolation => "BOUNDARY_VIOLATION",
    ConversionFailure => "CONVERSION_FAILURE",
    TraversalVelocity => "TRAVERSAL_VELOCITY",
    TraversalCompactness => "TRAVERSAL_COMPACTNESS",
    PriceAcceptanceRatio => "PRICE_ACCEPTANCE_RATIO",
    ZonePenetrationDepth => "ZONE_PENETRATION_DEPTH",
    DisplacementOriginAnchor => "DISPLACEMENT_ORIGIN_ANCHOR",
    CentralTendencyDeviation => "CENTRAL_TENDENCY_DEVIATION",
    StructuralAbsenceDuration => "STRUCTURAL_ABSENCE_DURATION",
    TraversalVoidSpan => "TRAVERSAL_VOID_SPAN",
    EventNonOccurrence => "EVENT_NON_OCCURRENCE",
    StructuralPersistenceDuration => "STRUCTURAL_PERSISTENCE_DURATION",
    StructuralExposureCount => "STRUCTURAL_EXPOSURE_COUNT",
}

impl QueryKind {
    /// Resolve a caller-supplied name. Unknown names are denied.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::from_name(name)
            .ok_or_else(|| AccessError::AccessDenied(format!("unknown query type '{name}'")))
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            QueryKind::Identity => IDENTITY_FIELDS,
            QueryKind::LocalContext => LOCAL_CONTEXT_FIELDS,
            QueryKind::TemporalSequence => TEMPORAL_SEQUENCE_FIELDS,
            QueryKind::SpatialGroup => SPATIAL_GROUP_FIELDS,
            QueryKind::StateDistribution => STATE_DISTRIBUTION_FIELDS,
            QueryKind::Proximity => PROXIMITY_FIELDS,
            QueryKind::BoundaryViolation => BOUNDARY_VIOLATION_FIELDS,
            QueryKind::ConversionFailure => CONVERSION_FAILURE_FIELDS,
            QueryKind::TraversalVelocity => TRAVERSAL_VELOCITY_FIELDS,
            QueryKind::TraversalCompactness => TRAVERSAL_COMPACTNESS_FIELDS,
            QueryKind::PriceAcceptanceRatio => PRICE_ACCEPTANCE_RATIO_FIELDS,
            QueryKind::ZonePenetrationDepth => ZONE_PENETRATION_DEPTH_FIELDS,
            QueryKind::DisplacementOriginAnchor => DISPLACEMENT_ORIGIN_ANCHOR_FIELDS,
            QueryKind::CentralTendencyDeviation => CENTRAL_TENDENCY_DEVIATION_FIELDS,
            QueryKind::StructuralAbsenceDuration | QueryKind::StructuralPersistenceDuration => {
                PRESENCE_WINDOW_FIELDS
            }
            QueryKind::TraversalVoidSpan => TRAVERSAL_VOID_SPAN_FIELDS,
            QueryKind::EventNonOccurrence => EVENT_NON_OCCURRENCE_FIELDS,
            QueryKind::StructuralExposureCount => STRUCTURAL_EXPOSURE_COUNT_FIELDS,
        }
    }

    pub fn shape(self) -> ResultShape {
        match self {
            QueryKind::TemporalSequence => ResultShape::Temporal,
            QueryKind::SpatialGroup => ResultShape::Spatial,
            QueryKind::Proximity => ResultShape::Proximity,
            _ => ResultShape::Single,
        }
    }

    /// Queries with no store-side traversal history behind them yet.
    pub fn is_wired(self) -> bool {
        !matches!(
            self,
            QueryKind::BoundaryViolation | QueryKind::ConversionFailure
        )
    }

    /// Declared contract as JSON, for introspection surfaces.
    pub fn describe(self) -> Value {
        let fields: Vec<Value> = self
            .fields()
            .iter()
            .map(|f| json!({"name": f.name, "type": f.ty.name(), "required": f.required}))
            .collect();
        json!({"query_type": self.name(), "wired": self.is_wired(), "fields": fields})
    }
}

/// Drop every field the contract does not declare.
pub fn retain_declared(kind: QueryKind, params: Params) -> Params {
    let fields = kind.fields();
    params
        .into_iter()
        .filter(|(key, _)| {
            let declared = fields.iter().any(|f| f.name == key.as_str());
            if !declared {
                tracing::debug!(query = kind.name(), field = %key, "dropping undeclared field");
            }
            declared
        })
        .collect()
}

/// Check every declared field against its type. Absent or null values are
/// accepted here; missing required fields are reported at construction.
pub fn check_fields(kind: QueryKind, params: &Params) -> Result<()> {
    for spec in kind.fields() {
        let Some(value) = params.get(spec.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        check_value(spec, value)?;
    }
    Ok(())
}

fn check_value(spec: &FieldSpec, value: &Value) -> Result<()> {
    let ok = match spec.ty {
        FieldType::Float => value.is_number(),
        FieldType::Int => value.is_i64() || value.is_u64(),
        FieldType::Bool => value.is_boolean(),
        FieldType::Str => value.is_string(),
        FieldType::FloatList => is_list_of(value, Value::is_number),
        FieldType::StrList => is_list_of(value, Value::is_string),
        FieldType::IntervalList => is_list_of(value, |pair| {
            pair.as_array()
                .is_some_and(|p| p.len() == 2 && p.iter().all(Value::is_number))
        }),
        FieldType::View => {
            let legal = ViewKind::ALL.map(ViewKind::as_str);
            return check_variant(spec.name, value, &legal);
        }
        FieldType::StateList => {
            let Some(items) = value.as_array() else {
                return Err(type_error(spec, value));
            };
            let legal = LifecycleState::ALL.map(LifecycleState::as_str);
            for item in items {
                check_variant(spec.name, item, &legal)?;
            }
            return Ok(());
        }
    };
    if ok { Ok(()) } else { Err(type_error(spec, value)) }
}

fn is_list_of(value: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    value.as_array().is_some_and(|items| items.iter().all(pred))
}

fn check_variant(field: &str, value: &Value, legal: &[&str]) -> Result<()> {
    match value.as_str() {
        Some(s) if legal.contains(&s) => Ok(()),
        _ => Err(AccessError::SchemaValidation(format!(
            "field '{field}' must be one of [{}], got {value}",
            legal.join(", ")
        ))),
    }
}

fn type_error(spec: &FieldSpec, value: &Value) -> AccessError {
    AccessError::SchemaValidation(format!(
        "field '{}' expects {}, got {}",
        spec.name,
        spec.ty.name(),
        json_type_name(value)
    ))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_names_round_trip() {
        for kind in QueryKind::ALL {
            assert_eq!(QueryKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(QueryKind::ALL.len(), 19);
    }

    #[test]
    fn test_unknown_name_is_access_denied() {
        let err = QueryKind::resolve("LATEST_SIGNAL").unwrap_err();
        assert!(matches!(err, AccessError::AccessDenied(_)));
    }

    #[test]
    fn test_name_resolution_is_exact() {
        assert!(QueryKind::resolve("identity").is_err());
    }

    #[test]
    fn test_undeclared_fields_dropped() {
        let p = params(json!({"node_id": "n1", "current_ts": 5, "colour": "red"}));
        let kept = retain_declared(QueryKind::Identity, p);
        assert_eq!(kept.len(), 2);
        assert!(!kept.contains_key("colour"));
    }

    #[test]
    fn test_float_accepts_integer() {
        let p = params(json!({"node_id": "n1", "current_ts": 5}));
        assert!(check_fields(QueryKind::Identity, &p).is_ok());
    }

    #[test]
    fn test_int_rejects_float() {
        let p = params(json!({"node_id": "n1", "query_end_ts": 5, "max_tokens": 2.5}));
        let err = check_fields(QueryKind::TemporalSequence, &p).unwrap_err();
        assert_eq!(
            err,
            AccessError::SchemaValidation("field 'max_tokens' expects int, got float".into())
        );
    }

    #[test]
    fn test_bool_rejects_string() {
        let p = params(json!({
            "min_price": 1,
            "max_price": 2,
            "current_ts": 3,
            "include_dormant": "yes"
        }));
        assert!(check_fields(QueryKind::SpatialGroup, &p).is_err());
    }

    #[test]
    fn test_null_accepted_for_optional() {
        let p = params(json!({"current_ts": 1, "symbol": null}));
        assert!(check_fields(QueryKind::StateDistribution, &p).is_ok());
    }

    #[test]
    fn test_bad_view_lists_legal_options() {
        let p = params(json!({"node_id": "n1", "view_type": "MOMENTUM", "current_ts": 1}));
        let err = check_fields(QueryKind::LocalContext, &p).unwrap_err();
        let AccessError::SchemaValidation(msg) = err else {
            panic!("expected schema error");
        };
        assert!(msg.contains("COMPOSITION, DENSITY, STABILITY"), "{msg}");
    }

    #[test]
    fn test_bad_state_in_list_rejected() {
        let p = params(json!({
            "min_price": 1,
            "max_price": 2,
            "current_ts": 3,
            "states": ["ACTIVE", "HOT"]
        }));
        assert!(check_fields(QueryKind::SpatialGroup, &p).is_err());
    }

    #[test]
    fn test_interval_list_requires_pairs() {
        let good = params(json!({
            "window_start": 0,
            "window_end": 10,
            "presence_intervals": [[1, 2]]
        }));
        let bad = params(json!({
            "window_start": 0,
            "window_end": 10,
            "presence_intervals": [[1, 2, 3]]
        }));
        assert!(check_fields(QueryKind::StructuralAbsenceDuration, &good).is_ok());
        assert!(check_fields(QueryKind::StructuralAbsenceDuration, &bad).is_err());
    }

    #[test]
    fn test_describe_lists_contract() {
        let d = QueryKind::TemporalSequence.describe();
        assert_eq!(d["query_type"], json!("TEMPORAL_SEQUENCE"));
        assert_eq!(d["wired"], json!(true));
        assert_eq!(d["fields"].as_array().unwrap().len(), 4);
        assert_eq!(
            d["fields"][3],
            json!({"name": "max_tokens", "type": "int", "required": false})
        );
    }

    #[test]
    fn test_only_boundary_queries_are_unwired() {
        let unwired: Vec<_> = QueryKind::ALL.iter().filter(|k| !k.is_wired()).collect();
        assert_eq!(
            unwired,
            vec![&QueryKind::BoundaryViolation, &QueryKind::ConversionFailure]
        );
    }
}
