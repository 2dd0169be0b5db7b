//! Input guards: forbidden keys, forbidden value substrings, implicit time.
//!
//! Guards always run on the raw caller parameters, in the fixed order
//! keys → values → determinism, before any default is injected. The
//! tables themselves are policy data ([`GuardPolicy`]) so deployments can
//! extend them without code changes.

use std::collections::BTreeSet;

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AccessError, Result};

/// Raw caller-supplied parameters.
pub type Params = Map<String, Value>;

const FORBIDDEN_KEYS: &[&str] = &[
    "signal",
    "score",
    "strength",
    "confidence",
    "bias",
    "sentiment",
    "recommendation",
    "prediction",
    "quality",
    "importance",
    "rank",
    "rating",
    "conviction",
    "trade_idea",
    "entry_price",
    "exit_price",
    "target_price",
    "stop_loss",
    "take_profit",
];

const FORBIDDEN_VALUE_PATTERNS: &[&str] = &[
    "STRONG_",
    "WEAK_",
    "BULLISH",
    "BEARISH",
    "HIGH_PROBABILITY",
    "LOW_PROBABILITY",
    "GOOD_",
    "BAD_",
    "BREAKOUT",
    "REVERSAL",
    "SIGNAL",
];

const IMPLICIT_TIME_TOKENS: &[&str] = &["now", "latest", "current", "realtime"];

const FORBIDDEN_OUTPUT_FIELDS: &[&str] = &[
    "signal",
    "score",
    "strength",
    "confidence",
    "bias",
    "sentiment",
    "recommendation",
    "prediction",
    "quality",
    "importance",
    "rank",
    "rating",
    "is_strong",
    "is_weak",
    "is_valid_level",
];

/// Guard and normalizer tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardPolicy {
    /// Parameter names that may never be supplied.
    pub forbidden_keys: BTreeSet<String>,
    /// Case-insensitive substrings that may not appear in any string value.
    pub forbidden_value_patterns: Vec<String>,
    /// Values that stand in for an unspecified "now".
    pub implicit_time_tokens: Vec<String>,
    /// Result keys that make the whole response refused.
    pub forbidden_output_fields: BTreeSet<String>,
    /// Inserted for every absent key before schema resolution.
    pub neutral_defaults: Params,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        let mut neutral_defaults = Params::new();
        neutral_defaults.insert("include_dormant".into(), Value::Bool(false));
        neutral_defaults.insert("symbol".into(), Value::Null);
        neutral_defaults.insert("lookback_seconds".into(), Value::Null);
        neutral_defaults.insert("max_tokens".into(), Value::Null);
        neutral_defaults.insert("states".into(), Value::Null);

        Self {
            forbidden_keys: FORBIDDEN_KEYS.iter().map(|s| s.to_string()).collect(),
            forbidden_value_patterns: FORBIDDEN_VALUE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            implicit_time_tokens: IMPLICIT_TIME_TOKENS.iter().map(|s| s.to_string()).collect(),
            forbidden_output_fields: FORBIDDEN_OUTPUT_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            neutral_defaults,
        }
    }
}

/// Compiled guard: the policy plus a case-insensitive matcher over the
/// forbidden value patterns.
#[derive(Clone, Debug)]
pub struct Guard {
    policy: GuardPolicy,
    value_patterns: RegexSet,
}

impl Guard {
    pub fn new(policy: GuardPolicy) -> Result<Self> {
        let value_patterns = RegexSet::new(
            policy
                .forbidden_value_patterns
                .iter()
                .map(|p| format!("(?i){}", regex::escape(p))),
        )
        .map_err(|e| AccessError::SchemaValidation(format!("invalid guard pattern: {e}")))?;
        Ok(Self {
            policy,
            value_patterns,
        })
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Run all three checks in their fixed order.
    pub fn check(&self, params: &Params) -> Result<()> {
        self.validate_keys(params)?;
        self.validate_values(params)?;
        self.enforce_determinism(params)
    }

    /// Reject forbidden parameter names, including keys of nested objects.
    pub fn validate_keys(&self, params: &Params) -> Result<()> {
        for (key, value) in params {
            if self.policy.forbidden_keys.contains(key.as_str()) {
                return Err(AccessError::EpistemicSafety(format!(
                    "forbidden parameter key '{key}'"
                )));
            }
            if let Value::Object(nested) = value {
                self.validate_keys(nested)?;
            }
        }
        Ok(())
    }

    /// Reject any string value containing a forbidden pattern.
    pub fn validate_values(&self, params: &Params) -> Result<()> {
        for (key, value) in params {
            let mut found = None;
            visit_strings(value, &mut |s| {
                if found.is_none()
                    && let Some(idx) = self.value_patterns.matches(s).into_iter().next()
                {
                    found = Some(idx);
                }
            });
            if let Some(idx) = found {
                return Err(AccessError::EpistemicSafety(format!(
                    "parameter '{key}' contains forbidden pattern '{}'",
                    self.policy.forbidden_value_patterns[idx]
                )));
            }
        }
        Ok(())
    }

    /// Reject implicit time references; timestamps must be explicit numbers.
    /// A value matches only when it equals a token exactly.
    pub fn enforce_determinism(&self, params: &Params) -> Result<()> {
        for (key, value) in params {
            let mut found = None;
            visit_strings(value, &mut |s| {
                if found.is_none() && self.policy.implicit_time_tokens.iter().any(|t| t == s) {
                    found = Some(s.to_string());
                }
            });
            if let Some(token) = found {
                return Err(AccessError::Determinism(format!(
                    "parameter '{key}' uses implicit time reference '{token}'; \
                     supply an explicit timestamp"
                )));
            }
        }
        Ok(())
    }

    /// Copy of `params` with every absent neutral default filled in.
    pub fn inject_neutral_defaults(&self, params: &Params) -> Params {
        let mut out = params.clone();
        for (key, value) in &self.policy.neutral_defaults {
            if !out.contains_key(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

fn visit_strings(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|v| visit_strings(v, f)),
        Value::Object(map) => map.values().for_each(|v| visit_strings(v, f)),
        _ => {}
    }
}
