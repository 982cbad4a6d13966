//! Property-based tests for the column ordering rules.
//!
//! Uses proptest to verify:
//! 1. A splice keeps every id exactly once.
//! 2. Ids other than the moving one keep their relative order.
//! 3. The moving id lands at the clamped insertion index.
//! 4. Replaying a splice at the index it produced changes nothing.

use kanban_proto::ordering::{insertion_index, is_dense, position_at, splice};
use proptest::prelude::*;

/// Strategy for a column of distinct ids `0..len` in shuffled order.
fn arb_column() -> impl Strategy<Value = Vec<u32>> {
    (0usize..24)
        .prop_flat_map(|len| Just((0..position_at(len)).collect::<Vec<u32>>()).prop_shuffle())
}

/// Strategy for requested positions, including negative and oversized ones.
fn arb_requested() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        Just(None),
        (-50i64..50).prop_map(Some),
        any::<i64>().prop_map(Some),
    ]
}

proptest! {
    /// Every id survives the splice exactly once.
    #[test]
    fn splice_keeps_each_id_once(column in arb_column(), requested in arb_requested()) {
        let moving = 1000;
        let result = splice(column.clone(), moving, requested);
        prop_assert_eq!(result.len(), column.len() + 1);
        prop_assert_eq!(result.iter().filter(|id| **id == moving).count(), 1);
        for id in &column {
            prop_assert_eq!(result.iter().filter(|x| *x == id).count(), 1);
        }
    }

    /// Untouched ids keep their relative order.
    #[test]
    fn splice_preserves_relative_order(
        column in arb_column().prop_filter("non-empty", |c| !c.is_empty()),
        pick in any::<prop::sample::Index>(),
        requested in arb_requested(),
    ) {
        let moving = column[pick.index(column.len())];
        let expected: Vec<u32> = column.iter().copied().filter(|id| *id != moving).collect();
        let result = splice(column, moving, requested);
        let others: Vec<u32> = result.iter().copied().filter(|id| *id != moving).collect();
        prop_assert_eq!(others, expected);
    }

    /// The moving id lands at the clamped index.
    #[test]
    fn moving_id_lands_at_clamped_index(column in arb_column(), requested in arb_requested()) {
        let moving = 1000;
        let expected = insertion_index(requested, column.len());
        let result = splice(column, moving, requested);
        prop_assert_eq!(result.iter().position(|id| *id == moving), Some(expected));
        prop_assert!(is_dense((0..result.len()).map(position_at)));
    }

    /// Re-applying a move at its own landing index is a no-op.
    #[test]
    fn repeated_move_is_idempotent(
        column in arb_column().prop_filter("non-empty", |c| !c.is_empty()),
        pick in any::<prop::sample::Index>(),
        requested in arb_requested(),
    ) {
        let moving = column[pick.index(column.len())];
        let once = splice(column, moving, requested);
        let landed = once.iter().position(|id| *id == moving).map(|i| i64::try_from(i).unwrap_or(i64::MAX));
        let twice = splice(once.clone(), moving, landed);
        prop_assert_eq!(once, twice);
    }
}
