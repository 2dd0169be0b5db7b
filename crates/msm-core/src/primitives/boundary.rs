use serde::{Deserialize, Serialize};

use super::{finite, same_length, strictly_increasing};
use crate::error::{PrimitiveError, PrimitiveResult};

/// Side from which price crossed the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossingDirection {
    /// Price started below the boundary and traded above it.
    Upward,
    /// Price started above the boundary and traded below it.
    Downward,
}

impl CrossingDirection {
    /// +1.0 for upward, -1.0 for downward.
    fn sign(self) -> f64 {
        match self {
            CrossingDirection::Upward => 1.0,
            CrossingDirection::Downward => -1.0,
        }
    }
}

/// First contiguous excursion of price beyond a boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryViolation {
    pub boundary_price: f64,
    pub crossing_direction: CrossingDirection,
    /// Largest distance beyond the boundary during the excursion. Always > 0.
    pub violation_depth: f64,
    pub violation_start_ts: f64,
    pub violation_end_ts: f64,
    pub violation_duration: f64,
    pub observation_count: usize,
}

/// Price returning across the boundary after a violation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionFailure {
    pub boundary_price: f64,
    pub reversion_ts: f64,
    pub reversion_price: f64,
    /// Seconds from the end of the violation to the reversion observation.
    pub time_to_reversion: f64,
    /// Reversion happened on the first post-violation observation.
    pub immediate_reversion: bool,
}

/// Find the first excursion of `prices` across `boundary_price`.
///
/// The origin side is taken from the first price not equal to the boundary.
/// A violation starts at the first observation strictly on the other side
/// and lasts while subsequent observations stay strictly on that side.
/// Returns `None` when price never crosses.
pub fn detect_boundary_violation(
    boundary_price: f64,
    prices: &[f64],
    timestamps: &[f64],
) -> PrimitiveResult<Option<BoundaryViolation>> {
    finite("boundary_price", boundary_price)?;
    same_length("prices", prices.len(), "timestamps", timestamps.len())?;
    super::all_finite("prices", prices)?;
    strictly_increasing("timestamps", timestamps)?;

    let Some(origin) = prices.iter().position(|&p| p != boundary_price) else {
        return Ok(None);
    };
    let direction = if prices[origin] < boundary_price {
        CrossingDirection::Upward
    } else {
        CrossingDirection::Downward
    };
    let beyond = |p: f64| (p - boundary_price) * direction.sign() > 0.0;

    let Some(offset) = prices[origin..].iter().position(|&p| beyond(p)) else {
        return Ok(None);
    };
    let start = origin + offset;
    let len = prices[start..].iter().take_while(|&&p| beyond(p)).count();
    let end = start + len - 1;

    let violation_depth = prices[start..=end]
        .iter()
        .map(|p| (p - boundary_price).abs())
        .fold(0.0, f64::max);

    Ok(Some(BoundaryViolation {
        boundary_price,
        crossing_direction: direction,
        violation_depth,
        violation_start_ts: timestamps[start],
        violation_end_ts: timestamps[end],
        violation_duration: timestamps[end] - timestamps[start],
        observation_count: len,
    }))
}

/// Detect price reverting back across the boundary within `conversion_window`
/// seconds of the violation's end.
///
/// Post-violation timestamps must be strictly increasing and strictly after
/// `violation.violation_end_ts`.
pub fn detect_conversion_failure(
    violation: &BoundaryViolation,
    prices: &[f64],
    timestamps: &[f64],
    conversion_window: f64,
) -> PrimitiveResult<Option<ConversionFailure>> {
    finite("conversion_window", conversion_window)?;
    if conversion_window <= 0.0 {
        return Err(PrimitiveError::Invalid(format!(
            "conversion_window must be positive, got {conversion_window}"
        )));
    }
    same_length("prices", prices.len(), "timestamps", timestamps.len())?;
    super::all_finite("prices", prices)?;
    strictly_increasing("timestamps", timestamps)?;
    if let Some(&first) = timestamps.first()
        && first <= violation.violation_end_ts
    {
        return Err(PrimitiveError::Invalid(format!(
            "post-violation timestamp {first} is not after violation end {}",
            violation.violation_end_ts
        )));
    }

    let boundary = violation.boundary_price;
    let sign = violation.crossing_direction.sign();
    let deadline = violation.violation_end_ts + conversion_window;

    let reverted = timestamps
        .iter()
        .zip(prices)
        .enumerate()
        .take_while(|(_, (ts, _))| **ts <= deadline)
        .find(|(_, (_, price))| (**price - boundary) * sign < 0.0);

    Ok(reverted.map(|(index, (&ts, &price))| ConversionFailure {
        boundary_price: boundary,
        reversion_ts: ts,
        reversion_price: price,
        time_to_reversion: ts - violation.violation_end_ts,
        immediate_reversion: index == 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn upward_violation() -> BoundaryViolation {
        detect_boundary_violation(
            100.0,
            &[98.0, 99.0, 101.0, 103.0, 102.0, 99.5],
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_no_crossing_returns_none() {
        let result = detect_boundary_violation(100.0, &[95.0, 97.0, 99.9], &[1.0, 2.0, 3.0]);
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_touching_boundary_is_not_a_violation() {
        let result = detect_boundary_violation(100.0, &[99.0, 100.0, 99.5], &[1.0, 2.0, 3.0]);
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_upward_excursion_measures_depth_and_span() {
        let v = upward_violation();
        assert_eq!(v.crossing_direction, CrossingDirection::Upward);
        assert_relative_eq!(v.violation_depth, 3.0);
        assert_eq!(v.violation_start_ts, 3.0);
        assert_eq!(v.violation_end_ts, 5.0);
        assert_eq!(v.violation_duration, 2.0);
        assert_eq!(v.observation_count, 3);
    }

    #[test]
    fn test_downward_excursion_until_end_of_sequence() {
        let v = detect_boundary_violation(50.0, &[52.0, 49.0, 47.5], &[10.0, 20.0, 30.0])
            .unwrap()
            .unwrap();
        assert_eq!(v.crossing_direction, CrossingDirection::Downward);
        assert_relative_eq!(v.violation_depth, 2.5);
        assert_eq!(v.violation_duration, 20.0);
    }

    #[test]
    fn test_origin_side_skips_leading_boundary_prices() {
        let v = detect_boundary_violation(10.0, &[10.0, 11.0, 9.0], &[1.0, 2.0, 3.0])
            .unwrap()
            .unwrap();
        assert_eq!(v.crossing_direction, CrossingDirection::Downward);
        assert_eq!(v.violation_start_ts, 3.0);
    }

    #[test]
    fn test_non_monotonic_timestamps_fail() {
        let err = detect_boundary_violation(100.0, &[99.0, 101.0], &[5.0, 5.0]).unwrap_err();
        assert!(matches!(err, PrimitiveError::NonMonotonic { .. }));
    }

    #[test]
    fn test_nan_price_fails() {
        let err = detect_boundary_violation(100.0, &[99.0, f64::NAN], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PrimitiveError::NonFinite { field: "prices", .. }));
    }

    #[test]
    fn test_length_mismatch_fails() {
        let err = detect_boundary_violation(100.0, &[99.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PrimitiveError::LengthMismatch { .. }));
    }

    #[test]
    fn test_empty_sequence_returns_none() {
        assert_eq!(detect_boundary_violation(100.0, &[], &[]), Ok(None));
    }

    #[test]
    fn test_immediate_reversion_detected() {
        let v = upward_violation();
        let c = detect_conversion_failure(&v, &[99.0, 98.0], &[6.0, 7.0], 10.0)
            .unwrap()
            .unwrap();
        assert!(c.immediate_reversion);
        assert_eq!(c.reversion_ts, 6.0);
        assert_eq!(c.time_to_reversion, 1.0);
    }

    #[test]
    fn test_delayed_reversion_within_window() {
        let v = upward_violation();
        let c = detect_conversion_failure(&v, &[101.0, 100.0, 99.0], &[6.0, 8.0, 9.0], 5.0)
            .unwrap()
            .unwrap();
        assert!(!c.immediate_reversion);
        assert_eq!(c.reversion_price, 99.0);
        assert_eq!(c.time_to_reversion, 4.0);
    }

    #[test]
    fn test_reversion_after_window_is_ignored() {
        let v = upward_violation();
        let c = detect_conversion_failure(&v, &[101.0, 99.0], &[6.0, 20.0], 5.0).unwrap();
        assert_eq!(c, None);
    }

    #[test]
    fn test_conversion_rejects_timestamps_inside_violation() {
        let v = upward_violation();
        let err = detect_conversion_failure(&v, &[99.0], &[5.0], 5.0).unwrap_err();
        assert!(matches!(err, PrimitiveError::Invalid(_)));
    }

    #[test]
    fn test_conversion_rejects_non_positive_window() {
        let v = upward_violation();
        assert!(detect_conversion_failure(&v, &[99.0], &[6.0], 0.0).is_err());
    }
}
