use serde::{Deserialize, Serialize};

use super::{all_finite, finite, same_length, strictly_increasing};
use crate::error::{PrimitiveError, PrimitiveResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalVelocity {
    /// Signed `price_end - price_start`.
    pub displacement: f64,
    pub elapsed_seconds: f64,
    /// Absolute distance per second.
    pub velocity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalCompactness {
    pub net_displacement: f64,
    pub path_length: f64,
    /// `|net| / path`, in [0, 1]. A path with no movement has compactness 1.
    pub compactness: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplacementOriginAnchor {
    pub anchor_price: f64,
    pub anchor_ts: f64,
    /// Signed distance from the anchor to the last observed price.
    pub displacement_from_anchor: f64,
}

pub fn compute_traversal_velocity(
    price_start: f64,
    price_end: f64,
    ts_start: f64,
    ts_end: f64,
) -> PrimitiveResult<TraversalVelocity> {
    finite("price_start", price_start)?;
    finite("price_end", price_end)?;
    let elapsed = super::window(ts_start, ts_end)?;
    let displacement = price_end - price_start;
    Ok(TraversalVelocity {
        displacement,
        elapsed_seconds: elapsed,
        velocity: displacement.abs() / elapsed,
    })
}

pub fn compute_traversal_compactness(prices: &[f64]) -> PrimitiveResult<TraversalCompactness> {
    if prices.len() < 2 {
        return Err(PrimitiveError::Invalid(format!(
            "compactness needs at least 2 prices, got {}",
            prices.len()
        )));
    }
    all_finite("prices", prices)?;

    let path_length: f64 = prices.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    let net_displacement = prices[prices.len() - 1] - prices[0];
    let compactness = if path_length == 0.0 {
        1.0
    } else {
        net_displacement.abs() / path_length
    };

    Ok(TraversalCompactness {
        net_displacement,
        path_length,
        compactness,
    })
}

/// Locate the price the move leading into an event originated from.
///
/// For net upward sequences the anchor is the most recent minimum; for net
/// downward sequences the most recent maximum. A flat sequence anchors on its
/// first observation.
pub fn compute_displacement_origin_anchor(
    prices: &[f64],
    timestamps: &[f64],
) -> PrimitiveResult<DisplacementOriginAnchor> {
    same_length("prices", prices.len(), "timestamps", timestamps.len())?;
    if prices.is_empty() {
        return Err(PrimitiveError::Invalid(
            "origin anchor needs at least one observation".to_string(),
        ));
    }
    all_finite("prices", prices)?;
    strictly_increasing("timestamps", timestamps)?;

    let first = prices[0];
    let last = prices[prices.len() - 1];

    let mut anchor = 0;
    if last > first {
        for (i, &p) in prices.iter().enumerate() {
            if p <= prices[anchor] {
                anchor = i;
            }
        }
    } else if last < first {
        for (i, &p) in prices.iter().enumerate() {
            if p >= prices[anchor] {
                anchor = i;
            }
        }
    }

    Ok(DisplacementOriginAnchor {
        anchor_price: prices[anchor],
        anchor_ts: timestamps[anchor],
        displacement_from_anchor: last - prices[anchor],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_velocity_is_distance_over_time() {
        let v = compute_traversal_velocity(100.0, 90.0, 1000.0, 1005.0).unwrap();
        assert_eq!(v.displacement, -10.0);
        assert_eq!(v.elapsed_seconds, 5.0);
        assert_relative_eq!(v.velocity, 2.0);
    }

    #[test]
    fn test_velocity_rejects_inverted_time() {
        let err = compute_traversal_velocity(1.0, 2.0, 10.0, 10.0).unwrap_err();
        assert!(matches!(err, PrimitiveError::InvertedWindow { .. }));
    }

    #[test]
    fn test_straight_path_is_fully_compact() {
        let c = compute_traversal_compactness(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(c.compactness, 1.0);
    }

    #[test]
    fn test_back_and_forth_path_is_less_compact() {
        // net 2, path 1 + 2 + 3 = 6
        let c = compute_traversal_compactness(&[10.0, 11.0, 9.0, 12.0]).unwrap();
        assert_relative_eq!(c.path_length, 6.0);
        assert_relative_eq!(c.compactness, 2.0 / 6.0);
    }

    #[test]
    fn test_flat_path_has_unit_compactness() {
        let c = compute_traversal_compactness(&[5.0, 5.0]).unwrap();
        assert_eq!(c.compactness, 1.0);
        assert_eq!(c.path_length, 0.0);
    }

    #[test]
    fn test_compactness_needs_two_prices() {
        assert!(compute_traversal_compactness(&[1.0]).is_err());
    }

    #[test]
    fn test_upward_anchor_is_latest_low() {
        let a = compute_displacement_origin_anchor(
            &[100.0, 98.0, 99.0, 98.0, 104.0],
            &[1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();
        assert_eq!(a.anchor_price, 98.0);
        assert_eq!(a.anchor_ts, 4.0);
        assert_eq!(a.displacement_from_anchor, 6.0);
    }

    #[test]
    fn test_downward_anchor_is_latest_high() {
        let a = compute_displacement_origin_anchor(&[50.0, 53.0, 51.0, 45.0], &[1.0, 2.0, 3.0, 4.0])
            .unwrap();
        assert_eq!(a.anchor_price, 53.0);
        assert_eq!(a.displacement_from_anchor, -8.0);
    }

    #[test]
    fn test_flat_sequence_anchors_on_first() {
        let a = compute_displacement_origin_anchor(&[7.0, 9.0, 7.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(a.anchor_ts, 1.0);
        assert_eq!(a.displacement_from_anchor, 0.0);
    }

    #[test]
    fn test_anchor_rejects_empty() {
        assert!(compute_displacement_origin_anchor(&[], &[]).is_err());
    }
}
