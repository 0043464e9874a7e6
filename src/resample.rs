//! Fixed-step resampling of irregular series
//!
//! Raw points come back from the datapoint store at whatever times they
//! were written. Consumers want one value per fixed step over `[start, end)`,
//! with `None` where nothing new arrived.
//!
//! # Rules
//!
//! - No points: step 1, no values.
//! - One point: step 1, that single value, regardless of the window.
//! - Otherwise the step is the smallest gap between adjacent timestamps over
//!   the first `N - 2` pairs (so the last pair is never considered), floored
//!   at 1. With exactly two points no pair is considered and the step is 1.
//! - `ceil((end - start) / step)` slots. A cursor walks the points; slot `i`
//!   takes the value of the latest point at or before `start + i * step`,
//!   unless that point already filled an earlier slot. The slot count is
//!   capped (see [`resample_capped`]).
//! - The last slot is never filled.
//!
//! # Example
//!
//! ```rust
//! use kuba_namespace::resample::resample;
//! use kuba_namespace::types::DataPoint;
//!
//! let points = [DataPoint::new(0, 10.0), DataPoint::new(2, 20.0), DataPoint::new(5, 30.0)];
//! let out = resample(&points, 0, 6);
//! assert_eq!(out.step, 2);
//! assert_eq!(out.values, vec![Some(10.0), Some(20.0), None]);
//! ```

use crate::types::DataPoint;
use serde::{Deserialize, Serialize};

/// A regularized series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resampled {
    /// Seconds between slots, at least 1
    pub step: i64,
    /// One entry per slot
    pub values: Vec<Option<f64>>,
}

impl Resampled {
    /// The result for a series with no data
    pub fn empty() -> Self {
        Self {
            step: 1,
            values: Vec::new(),
        }
    }
}

/// Default upper bound on the number of slots in one result
pub const DEFAULT_MAX_SLOTS: usize = 1_000_000;

/// Smallest adjacent gap over the first `len - 2` pairs, floored at 1
fn step_for(points: &[DataPoint]) -> i64 {
    let pairs = points.len().saturating_sub(2);
    points
        .windows(2)
        .take(pairs)
        .map(|w| w[1].timestamp.saturating_sub(w[0].timestamp))
        .min()
        .map(|delta| delta.max(1))
        .unwrap_or(1)
}

/// Number of `step`-wide slots covering `[start, end)`, capped at `max_slots`
fn slot_count(start: i64, end: i64, step: i64, max_slots: usize) -> usize {
    // Widened so spans across the whole i64 range cannot overflow
    let span = end as i128 - start as i128;
    if span <= 0 {
        return 0;
    }
    let step = step as i128;
    let slots = (span + step - 1) / step;
    usize::try_from(slots).unwrap_or(usize::MAX).min(max_slots)
}

/// Resample time-ordered `points` onto a fixed grid over `[start, end)`
///
/// Uses [`DEFAULT_MAX_SLOTS`]; see [`resample_capped`].
pub fn resample(points: &[DataPoint], start: i64, end: i64) -> Resampled {
    resample_capped(points, start, end, DEFAULT_MAX_SLOTS)
}

/// Resample with at most `max_slots` slots
///
/// A window needing more slots is cut short after the first `max_slots`;
/// the final slot of the shortened result is still left empty.
pub fn resample_capped(points: &[DataPoint], start: i64, end: i64, max_slots: usize) -> Resampled {
    match points.len() {
        0 => return Resampled::empty(),
        1 => {
            return Resampled {
                step: 1,
                values: vec![Some(points[0].value)],
            }
        },
        _ => {},
    }

    let step = step_for(points);
    let slots = slot_count(start, end, step, max_slots);
    let mut values = vec![None; slots];

    let mut cursor = 0;
    let mut used = false;
    for (i, slot) in values.iter_mut().enumerate().take(slots.saturating_sub(1)) {
        let slot_time = start as i128 + i as i128 * step as i128;

        while cursor + 1 < points.len() && points[cursor + 1].timestamp as i128 <= slot_time {
            cursor += 1;
            used = false;
        }

        let current = points[cursor];
        if !used && current.timestamp as i128 <= slot_time {
            used = true;
            *slot = Some(current.value);
        }
    }

    Resampled { step, values }
}
