//! Diff selection strategies.
//!
//! When an entity has several outstanding diffs the resolver acts on one
//! per tick; the kind's strategy decides which.

use rand::seq::SliceRandom;

use converge_core::{Diff, DiffSelectionKind};

/// Choose the diff to act on next.
#[must_use]
pub fn select_diff(strategy: DiffSelectionKind, diffs: &[Diff]) -> Option<&Diff> {
    match strategy {
        DiffSelectionKind::Basic => diffs.first(),
        DiffSelectionKind::Random => diffs.choose(&mut rand::thread_rng()),
    }
}
