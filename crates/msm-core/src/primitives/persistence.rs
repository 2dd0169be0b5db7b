use serde::{Deserialize, Serialize};

use super::absence::covered_duration;
use super::{window, within_window};
use crate::error::PrimitiveResult;

/// Time inside the presence intervals within an observation window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuralPersistence {
    pub observation_window: f64,
    pub persistence_duration: f64,
    pub persistence_ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuralExposure {
    pub exposure_count: usize,
    pub observation_window: f64,
}

pub fn compute_structural_persistence_duration(
    window_start: f64,
    window_end: f64,
    presence_intervals: &[(f64, f64)],
) -> PrimitiveResult<StructuralPersistence> {
    let observation_window = window(window_start, window_end)?;
    let persistence_duration = covered_duration(presence_intervals, window_start, window_end)?;
    Ok(StructuralPersistence {
        observation_window,
        persistence_duration,
        persistence_ratio: persistence_duration / observation_window,
    })
}

/// Count exposures inside `[window_start, window_end]` inclusive.
///
/// Duplicate timestamps are each counted. Any timestamp outside the window
/// is an error rather than silently excluded.
pub fn compute_structural_exposure_count(
    exposure_timestamps: &[f64],
    window_start: f64,
    window_end: f64,
) -> PrimitiveResult<StructuralExposure> {
    let observation_window = window(window_start, window_end)?;
    within_window(exposure_timestamps, window_start, window_end)?;
    Ok(StructuralExposure {
        exposure_count: exposure_timestamps.len(),
        observation_window,
    })
}
