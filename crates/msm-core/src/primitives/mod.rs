//! Structural primitives: pure functions over explicit prices and timestamps.
//!
//! Every function validates its inputs and returns an immutable record.
//! Identical inputs always produce identical records. No function reads a
//! clock, touches the store, or attaches a label to its output.

pub mod absence;
pub mod boundary;
pub mod persistence;
pub mod traversal;
pub mod zone;

pub use absence::{
    EventNonOccurrence, StructuralAbsence, TraversalVoidSpan, compute_event_non_occurrence,
    compute_structural_absence_duration, compute_traversal_void_span,
};
pub use boundary::{
    BoundaryViolation, ConversionFailure, CrossingDirection, detect_boundary_violation,
    detect_conversion_failure,
};
pub use persistence::{
    StructuralExposure, StructuralPersistence, compute_structural_exposure_count,
    compute_structural_persistence_duration,
};
pub use traversal::{
    DisplacementOriginAnchor, TraversalCompactness, TraversalVelocity,
    compute_displacement_origin_anchor, compute_traversal_compactness,
    compute_traversal_velocity,
};
pub use zone::{
    CentralTendencyDeviation, PriceAcceptance, ZonePenetration,
    compute_central_tendency_deviation, compute_price_acceptance_ratio,
    compute_zone_penetration_depth,
};

use crate::error::{PrimitiveError, PrimitiveResult};

pub(crate) fn finite(field: &'static str, value: f64) -> PrimitiveResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PrimitiveError::NonFinite { field, value })
    }
}

pub(crate) fn all_finite(field: &'static str, values: &[f64]) -> PrimitiveResult<()> {
    for &v in values {
        finite(field, v)?;
    }
    Ok(())
}

/// Window bounds must be finite and `end > start`.
pub(crate) fn window(start: f64, end: f64) -> PrimitiveResult<f64> {
    finite("window_start", start)?;
    finite("window_end", end)?;
    if end <= start {
        return Err(PrimitiveError::InvertedWindow { start, end });
    }
    Ok(end - start)
}

pub(crate) fn within_window(values: &[f64], start: f64, end: f64) -> PrimitiveResult<()> {
    for (index, &value) in values.iter().enumerate() {
        finite("timestamp", value)?;
        if value < start || value > end {
            return Err(PrimitiveError::OutsideWindow {
                index,
                value,
                start,
                end,
            });
        }
    }
    Ok(())
}

pub(crate) fn strictly_increasing(field: &'static str, values: &[f64]) -> PrimitiveResult<()> {
    all_finite(field, values)?;
    for (index, pair) in values.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(PrimitiveError::NonMonotonic {
                field,
                index: index + 1,
                previous: pair[0],
                value: pair[1],
            });
        }
    }
    Ok(())
}

pub(crate) fn same_length(
    left: &'static str,
    left_len: usize,
    right: &'static str,
    right_len: usize,
) -> PrimitiveResult<()> {
    if left_len != right_len {
        return Err(PrimitiveError::LengthMismatch {
            left,
            left_len,
            right,
            right_len,
        });
    }
    Ok(())
}
