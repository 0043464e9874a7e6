//! Property tests for the resampler
//!
//! Uses proptest to check the shape invariants of `resample` over random
//! time-ordered series and windows.

use kuba_namespace::resample::{resample, Resampled};
use kuba_namespace::types::DataPoint;
use proptest::prelude::*;

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Time-ordered series built from non-negative gaps
fn ordered_series(max_len: usize) -> impl Strategy<Value = Vec<DataPoint>> {
    (
        -1_000i64..1_000,
        prop::collection::vec((0i64..50, -1e6..1e6f64), 2..max_len),
    )
        .prop_map(|(first, steps)| {
            let mut ts = first;
            steps
                .into_iter()
                .map(|(gap, value)| {
                    ts += gap;
                    DataPoint::new(ts, value)
                })
                .collect()
        })
}

fn expected_slots(start: i64, end: i64, step: i64) -> usize {
    if end <= start {
        0
    } else {
        ((end - start + step - 1) / step) as usize
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Step is never below one and the slot count covers the window
    #[test]
    fn step_and_length(
        points in ordered_series(64),
        start in -2_000i64..2_000,
        span in -10i64..3_000,
    ) {
        let end = start + span;
        let out = resample(&points, start, end);

        prop_assert!(out.step >= 1);
        prop_assert_eq!(out.values.len(), expected_slots(start, end, out.step));
    }

    /// The final slot is always empty
    #[test]
    fn last_slot_empty(
        points in ordered_series(64),
        start in -2_000i64..2_000,
        span in 1i64..3_000,
    ) {
        let out = resample(&points, start, start + span);
        prop_assert_eq!(out.values.last().copied(), Some(None));
    }

    /// Each input point fills at most one slot, and only with its own value
    #[test]
    fn values_come_from_points_without_repeats(
        points in ordered_series(64),
        start in -2_000i64..2_000,
        span in 1i64..3_000,
    ) {
        let out = resample(&points, start, start + span);
        let filled: Vec<f64> = out.values.iter().flatten().copied().collect();

        prop_assert!(filled.len() <= points.len());
        for value in &filled {
            prop_assert!(points.iter().any(|p| p.value == *value));
        }
    }

    /// Step is the smallest gap over all pairs but the last, floored at one
    #[test]
    fn step_is_min_gap(points in ordered_series(64)) {
        let out = resample(&points, 0, 1);
        let pairs = points.len() - 2;
        let min_gap = points
            .windows(2)
            .take(pairs)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .min()
            .unwrap_or(1)
            .max(1);
        prop_assert_eq!(out.step, min_gap);
    }

    /// A single point comes back as-is regardless of the window
    #[test]
    fn single_point(ts in -10_000i64..10_000, value in -1e6..1e6f64, start in -100i64..100, span in -10i64..100) {
        let out = resample(&[DataPoint::new(ts, value)], start, start + span);
        prop_assert_eq!(out, Resampled { step: 1, values: vec![Some(value)] });
    }
}

// =============================================================================
// Pinned Examples
// =============================================================================

#[test]
fn test_reference_series() {
    let points = [
        DataPoint::new(0, 10.0),
        DataPoint::new(2, 20.0),
        DataPoint::new(5, 30.0),
    ];
    let out = resample(&points, 0, 6);
    assert_eq!(out.step, 2);
    assert_eq!(out.values, vec![Some(10.0), Some(20.0), None]);
}

#[test]
fn test_zero_points() {
    let out = resample(&[], 0, 60);
    assert_eq!(out.step, 1);
    assert!(out.values.is_empty());
}

#[test]
fn test_regular_series_fills_all_but_last() {
    let points: Vec<DataPoint> = (0..10).map(|i| DataPoint::new(i * 10, i as f64)).collect();
    let out = resample(&points, 0, 100);
    assert_eq!(out.step, 10);
    let expected: Vec<Option<f64>> = (0..9).map(|i| Some(i as f64)).chain([None]).collect();
    assert_eq!(out.values, expected);
}
