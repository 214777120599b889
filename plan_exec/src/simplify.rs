//! # Path simplifier
//!
//! Reduces a pixel path to the points at which its direction changes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::maths::sign;

use crate::grid::Cell;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Turn points of a path, always including its first and last cell.
pub type SimplifiedPath = Vec<Cell>;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Simplify a path, keeping only the endpoints and the points where the direction changes.
///
/// The direction of a segment is the sign of its row and column deltas. Inputs of fewer than 3
/// points are returned unchanged.
pub fn simplify(path: &[Cell]) -> SimplifiedPath {
    if path.len() < 3 {
        return path.to_vec();
    }

    let mut simplified = Vec::with_capacity(path.len());
    simplified.push(path[0]);

    for w in path.windows(3) {
        if direction(w[0], w[1]) != direction(w[1], w[2]) {
            simplified.push(w[1]);
        }
    }

    simplified.push(path[path.len() - 1]);
    simplified
}

/// Sign vector `(d_row, d_col)` of the segment from `a` to `b`.
pub fn direction(a: Cell, b: Cell) -> (i64, i64) {
    (sign(b.row - a.row), sign(b.col - a.col))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn cells(v: &[(i64, i64)]) -> Vec<Cell> {
        v.iter().map(|c| Cell::from(*c)).collect()
    }

    #[test]
    fn test_simplify() {
        // Diagonal collapses to its endpoints
        let diag = cells(&[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
        assert_eq!(simplify(&diag), cells(&[(0, 0), (4, 4)]));

        // L shape keeps its corner
        let l = cells(&[(0, 0), (0, 1), (0, 2), (1, 2), (2, 2)]);
        assert_eq!(simplify(&l), cells(&[(0, 0), (0, 2), (2, 2)]));

        // Degenerate inputs
        assert_eq!(simplify(&[]), vec![]);
        assert_eq!(simplify(&cells(&[(3, 3)])), cells(&[(3, 3)]));
        assert_eq!(simplify(&cells(&[(3, 3), (3, 4)])), cells(&[(3, 3), (3, 4)]));
    }

    #[test]
    fn test_simplify_idempotent() {
        let paths = vec![
            cells(&[(0, 0), (0, 1), (1, 2), (2, 3), (2, 4), (3, 4), (4, 4), (5, 3)]),
            cells(&[(2, 2), (1, 1), (0, 0), (0, 1), (0, 2), (1, 3), (1, 4)]),
            cells(&[(0, 0), (1, 0), (2, 0), (2, 1), (1, 1), (0, 1)]),
        ];

        for p in paths {
            let once = simplify(&p);
            assert_eq!(once.first(), p.first());
            assert_eq!(once.last(), p.last());
            assert_eq!(simplify(&once), once);
        }
    }
}
