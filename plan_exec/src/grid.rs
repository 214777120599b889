//! # Traversability grid
//!
//! The grid is the binary mask produced by the segmentation step, `true` marking a drivable cell.
//! It is immutable once built.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A cell in the grid, indexed by row and column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: i64,
    pub col: i64,
}

/// A binary traversability mask.
#[derive(Debug, Clone)]
pub struct Grid {
    data: Array2<bool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GridError {
    #[error("The grid has no cells")]
    Empty,

    #[error("Row {row} has {found} cells but row 0 has {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unexpected character {ch:?} at row {row}, column {col}")]
    BadChar { row: usize, col: usize, ch: char },

    #[error("Unexpected value {value} at row {row}, column {col}, expected 0 or 1")]
    BadValue { row: usize, col: usize, value: u8 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Cell {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// The cell offset from this one by `(d_row, d_col)`.
    pub fn offset(&self, d_row: i64, d_col: i64) -> Self {
        Self::new(self.row + d_row, self.col + d_col)
    }
}

impl From<(i64, i64)> for Cell {
    fn from((row, col): (i64, i64)) -> Self {
        Self::new(row, col)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl Grid {
    /// Build a grid from an existing mask.
    pub fn from_array(data: Array2<bool>) -> Result<Self, GridError> {
        if data.is_empty() {
            return Err(GridError::Empty);
        }

        Ok(Self { data })
    }

    /// Build a grid from rows of `0`/`1` values.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, GridError> {
        let num_cols = rows.first().map(|r| r.len()).unwrap_or(0);

        let mut cells = Vec::with_capacity(rows.len() * num_cols);

        for (r, row) in rows.iter().enumerate() {
            if row.len() != num_cols {
                return Err(GridError::Ragged {
                    row: r,
                    expected: num_cols,
                    found: row.len(),
                });
            }

            for (c, v) in row.iter().enumerate() {
                match v {
                    0 => cells.push(false),
                    1 => cells.push(true),
                    _ => {
                        return Err(GridError::BadValue {
                            row: r,
                            col: c,
                            value: *v,
                        })
                    }
                }
            }
        }

        if cells.is_empty() {
            return Err(GridError::Empty);
        }

        // Shape is guaranteed to match by the checks above
        let data = Array2::from_shape_vec((rows.len(), num_cols), cells)
            .map_err(|_| GridError::Empty)?;

        Self::from_array(data)
    }

    /// Parse a plain text mask, one row per line.
    ///
    /// `1` and `#` are drivable, `0` and `.` are blocked. Blank lines and whitespace around rows
    /// are ignored.
    pub fn from_text(text: &str) -> Result<Self, GridError> {
        let mut rows = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let r = rows.len();
            let mut row = Vec::with_capacity(line.len());

            for (c, ch) in line.chars().enumerate() {
                match ch {
                    '1' | '#' => row.push(1),
                    '0' | '.' => row.push(0),
                    _ => return Err(GridError::BadChar { row: r, col: c, ch }),
                }
            }

            rows.push(row);
        }

        Self::from_rows(&rows)
    }

    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.data.ncols()
    }

    /// Returns true if the cell lies within the grid.
    pub fn contains(&self, cell: Cell) -> bool {
        cell.row >= 0
            && cell.col >= 0
            && (cell.row as usize) < self.num_rows()
            && (cell.col as usize) < self.num_cols()
    }

    /// Returns true if the cell is inside the grid and drivable.
    pub fn is_traversable(&self, cell: Cell) -> bool {
        self.contains(cell) && self.data[[cell.row as usize, cell.col as usize]]
    }

    /// Number of drivable cells.
    pub fn num_traversable(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_text() {
        let grid = Grid::from_text(
            "
            1.#
            0#1
            ",
        )
        .unwrap();

        assert_eq!(grid.num_rows(), 2);
        assert_eq!(grid.num_cols(), 3);
        assert_eq!(grid.num_traversable(), 4);
        assert!(grid.is_traversable(Cell::new(0, 2)));
        assert!(!grid.is_traversable(Cell::new(0, 1)));
        assert!(!grid.is_traversable(Cell::new(-1, 0)));
        assert!(!grid.is_traversable(Cell::new(0, 3)));
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(Grid::from_text(""), Err(GridError::Empty)));
        assert!(matches!(
            Grid::from_text("11\n1"),
            Err(GridError::Ragged { row: 1, expected: 2, found: 1 })
        ));
        assert!(matches!(
            Grid::from_text("1x"),
            Err(GridError::BadChar { row: 0, col: 1, ch: 'x' })
        ));
        assert!(matches!(
            Grid::from_rows(&[vec![1, 2]]),
            Err(GridError::BadValue { value: 2, .. })
        ));
    }
}
