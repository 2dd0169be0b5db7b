use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{finite, window, within_window};
use crate::error::{PrimitiveError, PrimitiveResult};

/// Time outside the presence intervals inside an observation window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuralAbsence {
    pub observation_window: f64,
    pub presence_duration: f64,
    pub absence_duration: f64,
    pub absence_ratio: f64,
}

/// Gaps between consecutive traversal events and the window edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalVoidSpan {
    pub observation_window: f64,
    /// Ordered, non-overlapping `(start, end)` gaps with positive length.
    pub voids: Vec<(f64, f64)>,
    pub max_void_duration: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNonOccurrence {
    pub expected_count: usize,
    pub observed_count: usize,
    pub non_occurrence_count: usize,
    /// Expected identifiers never observed, in lexical order.
    pub missing_ids: Vec<String>,
}

/// Total length covered by the union of `intervals`. Every interval must lie
/// inside `[start, end]` with `a <= b`.
pub(crate) fn covered_duration(
    intervals: &[(f64, f64)],
    start: f64,
    end: f64,
) -> PrimitiveResult<f64> {
    let mut sorted = Vec::with_capacity(intervals.len());
    for (index, &(a, b)) in intervals.iter().enumerate() {
        finite("interval_start", a)?;
        finite("interval_end", b)?;
        if b < a {
            return Err(PrimitiveError::Invalid(format!(
                "presence interval {index} is inverted: ({a}, {b})"
            )));
        }
        for value in [a, b] {
            if value < start || value > end {
                return Err(PrimitiveError::OutsideWindow {
                    index,
                    value,
                    start,
                    end,
                });
            }
        }
        sorted.push((a, b));
    }
    sorted.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.total_cmp(&y.1)));

    let mut total = 0.0;
    let mut current: Option<(f64, f64)> = None;
    for (a, b) in sorted {
        current = match current {
            Some((ca, cb)) if a <= cb => Some((ca, cb.max(b))),
            Some((ca, cb)) => {
                total += cb - ca;
                Some((a, b))
            }
            None => Some((a, b)),
        };
    }
    if let Some((ca, cb)) = current {
        total += cb - ca;
    }
    Ok(total)
}

pub fn compute_structural_absence_duration(
    window_start: f64,
    window_end: f64,
    presence_intervals: &[(f64, f64)],
) -> PrimitiveResult<StructuralAbsence> {
    let observation_window = window(window_start, window_end)?;
    let presence_duration = covered_duration(presence_intervals, window_start, window_end)?;
    let absence_duration = observation_window - presence_duration;
    Ok(StructuralAbsence {
        observation_window,
        presence_duration,
        absence_duration,
        absence_ratio: absence_duration / observation_window,
    })
}

/// Timestamps may arrive in any order; they are sorted before gaps are taken.
/// With no events the single void spans the whole window.
pub fn compute_traversal_void_span(
    window_start: f64,
    window_end: f64,
    traversal_timestamps: &[f64],
) -> PrimitiveResult<TraversalVoidSpan> {
    let observation_window = window(window_start, window_end)?;
    within_window(traversal_timestamps, window_start, window_end)?;

    let mut events = traversal_timestamps.to_vec();
    events.sort_by(f64::total_cmp);

    let edges: Vec<f64> = std::iter::once(window_start)
        .chain(events)
        .chain(std::iter::once(window_end))
        .collect();

    let voids: Vec<(f64, f64)> = edges
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| (w[0], w[1]))
        .collect();
    let max_void_duration = voids.iter().map(|(a, b)| b - a).fold(0.0, f64::max);

    Ok(TraversalVoidSpan {
        observation_window,
        voids,
        max_void_duration,
    })
}

/// Count expected identifiers that never appear among the observed ones.
///
/// Duplicate observations and observed identifiers outside the expected set
/// do not change `observed_count`.
pub fn compute_event_non_occurrence<S: AsRef<str>>(
    expected_ids: &[S],
    observed_ids: &[S],
) -> PrimitiveResult<EventNonOccurrence> {
    let expected = identifier_set("expected_ids", expected_ids)?;
    let observed = identifier_set("observed_ids", observed_ids)?;

    let missing_ids: Vec<String> = expected
        .difference(&observed)
        .map(|s| s.to_string())
        .collect();
    let expected_count = expected.len();
    let non_occurrence_count = missing_ids.len();

    Ok(EventNonOccurrence {
        expected_count,
        observed_count: expected_count - non_occurrence_count,
        non_occurrence_count,
        missing_ids,
    })
}

fn identifier_set<'a, S: AsRef<str>>(
    field: &'static str,
    ids: &'a [S],
) -> PrimitiveResult<BTreeSet<&'a str>> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| {
            let id: &str = id.as_ref();
            if id.is_empty() {
                Err(PrimitiveError::EmptyIdentifier { field, index })
            } else {
                Ok(id)
            }
        })
        .collect()
}
