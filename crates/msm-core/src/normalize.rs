//! Output normalization: a fail-closed scan for evaluative keys, then a
//! deterministic ordering chosen by the query's result shape.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{AccessError, Result};
use crate::schema::ResultShape;

#[derive(Clone, Debug)]
pub struct Normalizer {
    forbidden_fields: BTreeSet<String>,
}

impl Normalizer {
    pub fn new(forbidden_fields: BTreeSet<String>) -> Self {
        Self { forbidden_fields }
    }

    /// Scan then order. Any forbidden key anywhere in `result` refuses the
    /// whole response.
    pub fn normalize(&self, result: Value, shape: ResultShape) -> Result<Value> {
        if let Some(path) = self.find_forbidden(&result, "$") {
            tracing::warn!(%path, "refusing result carrying evaluative field");
            return Err(AccessError::EpistemicSafety(format!(
                "result contains forbidden field at {path}"
            )));
        }
        Ok(order(result, shape))
    }

    fn find_forbidden(&self, value: &Value, path: &str) -> Option<String> {
        match value {
            Value::Object(map) => map.iter().find_map(|(key, v)| {
                let here = format!("{path}.{key}");
                if self.forbidden_fields.contains(key.as_str()) {
                    Some(here)
                } else {
                    self.find_forbidden(v, &here)
                }
            }),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, v)| self.find_forbidden(v, &format!("{path}[{i}]"))),
            _ => None,
        }
    }
}

fn sort_key(shape: ResultShape) -> Option<&'static str> {
    match shape {
        ResultShape::Temporal => Some("timestamp"),
        ResultShape::Spatial => Some("price"),
        ResultShape::Proximity => Some("distance"),
        ResultShape::Single => None,
    }
}

fn order(result: Value, shape: ResultShape) -> Value {
    match (sort_key(shape), result) {
        (Some(key), Value::Array(mut items)) => {
            // Stable sort; entries without a numeric key go last.
            let rank = |v: &Value| v.get(key).and_then(Value::as_f64).unwrap_or(f64::INFINITY);
            items.sort_by(|a, b| rank(a).partial_cmp(&rank(b)).unwrap_or(Ordering::Equal));
            Value::Array(items)
        }
        (_, other) => other,
    }
}
