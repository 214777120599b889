//! # Grid pathfinder
//!
//! Breadth-first search over the traversability grid using 8-connectivity. The first path found to
//! the end cell is returned, which has the minimum number of hops but is not necessarily the
//! shortest in Euclidean distance.
//!
//! Neighbours are always enumerated in the order given by [`NEIGHBOURS`], so among paths with the
//! same number of hops the one returned is fully determined by the grid.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use ndarray::Array2;
use std::collections::VecDeque;

use crate::{
    grid::{Cell, Grid},
    planner::PlanError,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Neighbour offsets as `(d_row, d_col)`, in the order they are visited.
///
/// The four axis neighbours (right, left, down, up) come first, followed by the four diagonals.
pub const NEIGHBOURS: [(i64, i64); 8] = [
    (0, 1),
    (0, -1),
    (1, 0),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Ordered cells from start to end, each adjacent to the previous one.
pub type PixelPath = Vec<Cell>;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Find a path between `start` and `end`.
///
/// Fails if either cell is outside the grid or not traversable, or if `end` cannot be reached.
pub fn find_path(grid: &Grid, start: Cell, end: Cell) -> Result<PixelPath, PlanError> {
    if !grid.is_traversable(start) {
        return Err(PlanError::InvalidStart(start));
    }
    if !grid.is_traversable(end) {
        return Err(PlanError::InvalidEnd(end));
    }

    // Parent of each visited cell, the start is its own parent
    let mut parents: Array2<Option<Cell>> = Array2::from_elem((grid.num_rows(), grid.num_cols()), None);
    parents[idx(start)] = Some(start);

    let mut queue = VecDeque::new();
    queue.push_back(start);

    let mut num_visited = 1usize;

    while let Some(current) = queue.pop_front() {
        if current == end {
            let path = backtrack(&parents, start, end);
            debug!(
                "Found path of {} cells from {} to {} after visiting {} cells",
                path.len(),
                start,
                end,
                num_visited
            );
            return Ok(path);
        }

        for (d_row, d_col) in NEIGHBOURS.iter() {
            let next = current.offset(*d_row, *d_col);

            if grid.is_traversable(next) && parents[idx(next)].is_none() {
                parents[idx(next)] = Some(current);
                queue.push_back(next);
                num_visited += 1;
            }
        }
    }

    trace!("Search from {} exhausted {} cells", start, num_visited);

    Err(PlanError::NoRoute { start, end })
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Array index of a cell already known to be inside the grid.
fn idx(cell: Cell) -> [usize; 2] {
    [cell.row as usize, cell.col as usize]
}

/// Walk the parent links back from `end` and return the path in start to end order.
fn backtrack(parents: &Array2<Option<Cell>>, start: Cell, end: Cell) -> PixelPath {
    let mut path = vec![end];
    let mut current = end;

    while current != start {
        match parents[idx(current)] {
            Some(p) => {
                path.push(p);
                current = p;
            }
            None => break,
        }
    }

    path.reverse();
    path
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Hop distance from `start` to every cell, computed independently of `find_path`.
    fn hop_distances(grid: &Grid, start: Cell) -> Array2<Option<usize>> {
        let mut dist = Array2::from_elem((grid.num_rows(), grid.num_cols()), None);
        dist[idx(start)] = Some(0);
        let mut frontier = vec![start];
        let mut d = 0;

        while !frontier.is_empty() {
            d += 1;
            let mut next_frontier = Vec::new();
            for c in frontier {
                for (dr, dc) in NEIGHBOURS.iter() {
                    let n = c.offset(*dr, *dc);
                    if grid.is_traversable(n) && dist[idx(n)].is_none() {
                        dist[idx(n)] = Some(d);
                        next_frontier.push(n);
                    }
                }
            }
            frontier = next_frontier;
        }

        dist
    }

    fn assert_adjacent(path: &[Cell]) {
        for w in path.windows(2) {
            let dr = (w[1].row - w[0].row).abs();
            let dc = (w[1].col - w[0].col).abs();
            assert!(dr <= 1 && dc <= 1 && (dr + dc) > 0, "{} -> {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_diagonal() {
        let grid = Grid::from_rows(&vec![vec![1; 5]; 5]).unwrap();

        let path = find_path(&grid, Cell::new(0, 0), Cell::new(4, 4)).unwrap();

        assert_eq!(
            path,
            (0..5).map(|i| Cell::new(i, i)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_hop_count() {
        let grid = Grid::from_text(
            "
            1111111
            1000001
            1011101
            1010101
            1110111
            ",
        )
        .unwrap();

        let start = Cell::new(4, 0);
        let dist = hop_distances(&grid, start);

        for r in 0..grid.num_rows() as i64 {
            for c in 0..grid.num_cols() as i64 {
                let end = Cell::new(r, c);
                match find_path(&grid, start, end) {
                    Ok(path) => {
                        assert_eq!(path.first(), Some(&start));
                        assert_eq!(path.last(), Some(&end));
                        assert_adjacent(&path);
                        assert!(path.iter().all(|c| grid.is_traversable(*c)));
                        assert_eq!(Some(path.len() - 1), dist[idx(end)]);
                    }
                    Err(PlanError::InvalidEnd(_)) => assert!(!grid.is_traversable(end)),
                    Err(e) => panic!("Unexpected error {}", e),
                }
            }
        }
    }

    #[test]
    fn test_not_found() {
        let grid = Grid::from_text(
            "
            110
            000
            011
            ",
        )
        .unwrap();

        assert_eq!(
            find_path(&grid, Cell::new(0, 0), Cell::new(2, 2)),
            Err(PlanError::NoRoute {
                start: Cell::new(0, 0),
                end: Cell::new(2, 2)
            })
        );
        assert_eq!(
            find_path(&grid, Cell::new(1, 1), Cell::new(0, 0)),
            Err(PlanError::InvalidStart(Cell::new(1, 1)))
        );
        assert_eq!(
            find_path(&grid, Cell::new(0, 0), Cell::new(5, 0)),
            Err(PlanError::InvalidEnd(Cell::new(5, 0)))
        );
        assert_eq!(
            find_path(&grid, Cell::new(0, 0), Cell::new(0, 0)),
            Ok(vec![Cell::new(0, 0)])
        );
    }

    #[test]
    fn test_neighbour_order() {
        // (0, 1), (1, 1) and (2, 1) are all one hop from the start, the right neighbour is
        // enumerated first so the straight path is found.
        let grid = Grid::from_rows(&vec![vec![1; 3]; 3]).unwrap();

        let path = find_path(&grid, Cell::new(1, 0), Cell::new(1, 2)).unwrap();
        assert_eq!(path, vec![Cell::new(1, 0), Cell::new(1, 1), Cell::new(1, 2)]);
    }
}
