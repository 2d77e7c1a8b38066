//! Property tests for the threshold state machine: one notification per
//! upward crossing, whatever the reading sequence looks like.

use ggwatch_core::threshold::{ArmState, step};
use proptest::prelude::*;

/// Count upward crossings the slow way: a reading at or above the
/// threshold that follows a reading below it (or is the first reading).
fn count_crossings(threshold: u32, values: &[u64]) -> usize {
    let t = u64::from(threshold);
    let mut below = true;
    let mut crossings = 0;
    for &v in values {
        if below && v >= t {
            crossings += 1;
        }
        below = v < t;
    }
    crossings
}

fn count_fires(threshold: u32, values: &[u64]) -> usize {
    let mut state = ArmState::Armed;
    let mut fires = 0;
    for &v in values {
        let out = step(state, threshold, v);
        if out.fired {
            fires += 1;
        }
        state = out.next;
    }
    fires
}

proptest! {
    #[test]
    fn fires_once_per_crossing(
        threshold in 1u32..2_000,
        values in prop::collection::vec(0u64..4_000, 0..64),
    ) {
        prop_assert_eq!(count_fires(threshold, &values), count_crossings(threshold, &values));
    }

    #[test]
    fn monotonic_rise_fires_exactly_once(
        threshold in 1u32..1_000,
        start in 0u64..1_000,
        steps in prop::collection::vec(0u64..50, 1..40),
    ) {
        let start = start.min(u64::from(threshold) - 1);
        let mut values = vec![start];
        let mut v = start;
        for s in steps {
            v += s;
            values.push(v);
        }
        // Make sure the rise actually reaches the threshold, then stays up.
        values.push(v.max(u64::from(threshold)));
        values.extend(std::iter::repeat_n(u64::from(threshold) + 5, 10));
        prop_assert_eq!(count_fires(threshold, &values), 1);
    }
}

#[test]
fn documented_sequence() {
    assert_eq!(count_fires(100, &[80, 120, 130, 90, 110]), 2);
    assert_eq!(count_fires(50, &[40, 50]), 1);
}
