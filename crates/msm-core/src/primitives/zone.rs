use serde::{Deserialize, Serialize};

use super::finite;
use crate::error::{PrimitiveError, PrimitiveResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceAcceptance {
    pub range: f64,
    /// `close - low`.
    pub close_offset: f64,
    /// Position of close within `[low, high]`, in [0, 1]. 0.5 for a zero range.
    pub acceptance_ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZonePenetration {
    pub zone_height: f64,
    /// Length of the overlap between the observed range and the zone.
    pub penetration_depth: f64,
    /// `penetration_depth / zone_height`, in [0, 1].
    pub penetration_ratio: f64,
    /// Observed range spans the whole zone.
    pub full_traversal: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CentralTendencyDeviation {
    pub deviation: f64,
    pub absolute_deviation: f64,
    /// `deviation / |central_value|`; absent when the central value is zero.
    pub relative_deviation: Option<f64>,
}

pub fn compute_price_acceptance_ratio(
    open: f64,
    high: f64,
    low: f64,
    close: f64,
) -> PrimitiveResult<PriceAcceptance> {
    finite("open", open)?;
    finite("high", high)?;
    finite("low", low)?;
    finite("close", close)?;
    if high < low {
        return Err(PrimitiveError::Invalid(format!(
            "high {high} is below low {low}"
        )));
    }
    for (name, value) in [("open", open), ("close", close)] {
        if value < low || value > high {
            return Err(PrimitiveError::Invalid(format!(
                "{name} {value} is outside [{low}, {high}]"
            )));
        }
    }

    let range = high - low;
    let close_offset = close - low;
    let acceptance_ratio = if range == 0.0 {
        0.5
    } else {
        close_offset / range
    };

    Ok(PriceAcceptance {
        range,
        close_offset,
        acceptance_ratio,
    })
}

pub fn compute_zone_penetration_depth(
    zone_low: f64,
    zone_high: f64,
    observed_low: f64,
    observed_high: f64,
) -> PrimitiveResult<ZonePenetration> {
    let zone_low = finite("zone_low", zone_low)?;
    let zone_height = super::window(zone_low, finite("zone_high", zone_high)?)?;
    finite("observed_low", observed_low)?;
    finite("observed_high", observed_high)?;
    if observed_high < observed_low {
        return Err(PrimitiveError::Invalid(format!(
            "observed_high {observed_high} is below observed_low {observed_low}"
        )));
    }

    let overlap_low = observed_low.max(zone_low);
    let overlap_high = observed_high.min(zone_high);
    let penetration_depth = (overlap_high - overlap_low).max(0.0);

    Ok(ZonePenetration {
        zone_height,
        penetration_depth,
        penetration_ratio: penetration_depth / zone_height,
        full_traversal: observed_low <= zone_low && observed_high >= zone_high,
    })
}

pub fn compute_central_tendency_deviation(
    price: f64,
    central_value: f64,
) -> PrimitiveResult<CentralTendencyDeviation> {
    finite("price", price)?;
    finite("central_value", central_value)?;
    let deviation = price - central_value;
    Ok(CentralTendencyDeviation {
        deviation,
        absolute_deviation: deviation.abs(),
        relative_deviation: (central_value != 0.0).then(|| deviation / central_value.abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_acceptance_ratio_positions_close() {
        let a = compute_price_acceptance_ratio(101.0, 110.0, 100.0, 107.5).unwrap();
        assert_relative_eq!(a.acceptance_ratio, 0.75);
        assert_eq!(a.range, 10.0);
    }

    #[test]
    fn test_zero_range_is_centered() {
        let a = compute_price_acceptance_ratio(5.0, 5.0, 5.0, 5.0).unwrap();
        assert_eq!(a.acceptance_ratio, 0.5);
    }

    #[test]
    fn test_acceptance_rejects_close_outside_range() {
        assert!(compute_price_acceptance_ratio(101.0, 110.0, 100.0, 111.0).is_err());
        assert!(compute_price_acceptance_ratio(101.0, 100.0, 110.0, 105.0).is_err());
    }

    #[test]
    fn test_partial_penetration_from_below() {
        let z = compute_zone_penetration_depth(100.0, 110.0, 95.0, 104.0).unwrap();
        assert_relative_eq!(z.penetration_depth, 4.0);
        assert_relative_eq!(z.penetration_ratio, 0.4);
        assert!(!z.full_traversal);
    }

    #[test]
    fn test_full_traversal_through_zone() {
        let z = compute_zone_penetration_depth(100.0, 110.0, 90.0, 120.0).unwrap();
        assert_eq!(z.penetration_depth, 10.0);
        assert_eq!(z.penetration_ratio, 1.0);
        assert!(z.full_traversal);
    }

    #[test]
    fn test_range_outside_zone_has_no_penetration() {
        let z = compute_zone_penetration_depth(100.0, 110.0, 111.0, 115.0).unwrap();
        assert_eq!(z.penetration_depth, 0.0);
    }

    #[test]
    fn test_degenerate_zone_fails() {
        assert!(compute_zone_penetration_depth(100.0, 100.0, 90.0, 120.0).is_err());
    }

    #[test]
    fn test_deviation_is_signed() {
        let d = compute_central_tendency_deviation(95.0, 100.0).unwrap();
        assert_eq!(d.deviation, -5.0);
        assert_eq!(d.absolute_deviation, 5.0);
        assert_relative_eq!(d.relative_deviation.unwrap(), -0.05);
    }

    #[test]
    fn test_deviation_from_zero_has_no_relative_value() {
        let d = compute_central_tendency_deviation(3.0, 0.0).unwrap();
        assert_eq!(d.relative_deviation, None);
    }

    #[test]
    fn test_deviation_rejects_infinity() {
        assert!(compute_central_tendency_deviation(f64::INFINITY, 1.0).is_err());
    }
}
