//! Pure column-ordering rules shared by the server engine and the client's
//! optimistic board.
//!
//! A column is an ordered list of task ids. Its positions are always the
//! list indices, so a column of `n` tasks holds exactly `{0, .., n-1}`.

/// Computes where a moving task lands in a destination column of `len`
/// tasks (the moving task already excluded).
///
/// Negative requests clamp to `0`, requests past the end and absent requests
/// append at `len`.
#[must_use]
pub fn insertion_index(requested: Option<i64>, len: usize) -> usize {
    match requested {
        None => len,
        Some(p) if p <= 0 => 0,
        Some(p) => usize::try_from(p).map_or(len, |p| p.min(len)),
    }
}

/// Returns `destination` with `moving` spliced in at the requested index.
///
/// Any existing occurrence of `moving` is removed first, so the result holds
/// it exactly once whatever column it came from.
#[must_use]
pub fn splice<T: PartialEq>(mut destination: Vec<T>, moving: T, requested: Option<i64>) -> Vec<T> {
    destination.retain(|id| *id != moving);
    let index = insertion_index(requested, destination.len());
    destination.insert(index, moving);
    destination
}

/// Converts a list index into a stored position.
#[must_use]
pub fn position_at(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Returns `true` if `positions`, in any order, are exactly `{0, .., n-1}`.
#[must_use]
pub fn is_dense(positions: impl IntoIterator<Item = u32>) -> bool {
    let mut positions: Vec<u32> = positions.into_iter().collect();
    positions.sort_unstable();
    positions
        .iter()
        .enumerate()
        .all(|(index, position)| position_at(index) == *position)
}
