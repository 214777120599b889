//! # Command synthesizer
//!
//! Converts a simplified path into motion primitives from the vehicle's point of view. The
//! vehicle's heading is tracked as an [`Orientation`] in grid coordinates, rows increasing
//! downwards, so a right turn takes an east facing vehicle to face south.
//!
//! Each segment is driven along its dominant axis. Segments moving along rows (including exact
//! diagonals) become `Forward(B)`, segments moving along columns become `Forward(A)`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::{Axis, CommandSequence, Primitive};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};
use util::maths::sign;

use crate::grid::Cell;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Heading of the vehicle as a unit `(d_row, d_col)` vector along one of the grid axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orientation {
    pub d_row: i64,
    pub d_col: i64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SynthError {
    #[error("At least 2 points are needed to synthesize commands, got {0}")]
    TooShort(usize),

    #[error("The first segment starting at {0} has zero length, no initial heading can be set")]
    DegenerateFirstSegment(Cell),

    #[error("No sequence of 90 degree turns takes heading {from} to {to}")]
    Unreachable { from: Orientation, to: Orientation },

    #[error("Segment of {0} cells is too long to encode")]
    SegmentTooLong(i64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Orientation {
    pub const NORTH: Self = Self { d_row: -1, d_col: 0 };
    pub const SOUTH: Self = Self { d_row: 1, d_col: 0 };
    pub const EAST: Self = Self { d_row: 0, d_col: 1 };
    pub const WEST: Self = Self { d_row: 0, d_col: -1 };

    /// Heading after a 90 degree right turn.
    pub fn turned_right(&self) -> Self {
        Self {
            d_row: self.d_col,
            d_col: -self.d_row,
        }
    }

    /// Heading after a 90 degree left turn.
    pub fn turned_left(&self) -> Self {
        Self {
            d_row: -self.d_col,
            d_col: self.d_row,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            d_row: -self.d_row,
            d_col: -self.d_col,
        }
    }

    /// Axis a forward move in this heading is driven along.
    pub fn axis(&self) -> Axis {
        if self.d_row != 0 {
            Axis::B
        } else {
            Axis::A
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.d_row, self.d_col)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Heading the vehicle starts with to drive the given path, set by its first segment.
pub fn initial_orientation(path: &[Cell]) -> Result<Orientation, SynthError> {
    if path.len() < 2 {
        return Err(SynthError::TooShort(path.len()));
    }

    match segment_heading(path[0], path[1]) {
        Some((o, _)) => Ok(o),
        None => Err(SynthError::DegenerateFirstSegment(path[0])),
    }
}

/// Convert a simplified path into a sequence of primitives.
///
/// The initial heading is that of the first segment, so the sequence always starts with a forward
/// move. Zero length segments after the first are skipped.
pub fn synthesize(path: &[Cell]) -> Result<CommandSequence, SynthError> {
    let mut heading = initial_orientation(path)?;
    let mut commands = CommandSequence::new();

    for w in path.windows(2) {
        let (target, len) = match segment_heading(w[0], w[1]) {
            Some(s) => s,
            None => continue,
        };

        let turns = turns_between(heading, target).map_err(|e| {
            error!("Cannot synthesize segment {} -> {}: {}", w[0], w[1], e);
            e
        })?;
        commands.extend(turns);
        heading = target;

        let magnitude = u32::try_from(len).map_err(|_| SynthError::SegmentTooLong(len))?;
        commands.push(Primitive::forward(heading.axis(), magnitude));
    }

    debug!(
        "Synthesized {} commands from {} path points",
        commands.len(),
        path.len()
    );

    Ok(commands)
}

/// Apply a sequence of primitives to a virtual vehicle, returning the start cell and the cell
/// reached after each forward move.
pub fn replay(start: Cell, initial: Orientation, commands: &[Primitive]) -> Vec<Cell> {
    let mut heading = initial;
    let mut pos = start;
    let mut waypoints = vec![start];

    for p in commands {
        match p {
            Primitive::TurnLeft => heading = heading.turned_left(),
            Primitive::TurnRight => heading = heading.turned_right(),
            Primitive::Forward { magnitude, .. } => {
                let m = *magnitude as i64;
                pos = pos.offset(heading.d_row * m, heading.d_col * m);
                waypoints.push(pos);
            }
        }
    }

    waypoints
}

/// The turns which take the vehicle from `current` to `target`, a reversal being two right turns.
pub fn turns_between(current: Orientation, target: Orientation) -> Result<Vec<Primitive>, SynthError> {
    if target == current {
        Ok(vec![])
    } else if target == current.turned_right() {
        Ok(vec![Primitive::TurnRight])
    } else if target == current.turned_left() {
        Ok(vec![Primitive::TurnLeft])
    } else if target == current.reversed() {
        Ok(vec![Primitive::TurnRight, Primitive::TurnRight])
    } else {
        Err(SynthError::Unreachable {
            from: current,
            to: target,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Heading and length of the segment from `a` to `b` along its dominant axis.
///
/// Returns `None` for a zero length segment.
fn segment_heading(a: Cell, b: Cell) -> Option<(Orientation, i64)> {
    let d_row = b.row - a.row;
    let d_col = b.col - a.col;

    if d_row == 0 && d_col == 0 {
        None
    } else if d_row.abs() >= d_col.abs() {
        Some((
            Orientation {
                d_row: sign(d_row),
                d_col: 0,
            },
            d_row.abs(),
        ))
    } else {
        Some((
            Orientation {
                d_row: 0,
                d_col: sign(d_col),
            },
            d_col.abs(),
        ))
    }
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
    fn test_turn_rule() {
        assert_eq!(Orientation::EAST.turned_right(), Orientation::SOUTH);
        assert_eq!(Orientation::EAST.turned_left(), Orientation::NORTH);
        assert_eq!(Orientation::NORTH.turned_right(), Orientation::EAST);
        assert_eq!(Orientation::WEST.turned_left(), Orientation::SOUTH);

        assert_eq!(
            turns_between(Orientation::SOUTH, Orientation::NORTH).unwrap(),
            vec![Primitive::TurnRight, Primitive::TurnRight]
        );
        assert!(matches!(
            turns_between(Orientation::EAST, Orientation { d_row: 1, d_col: 1 }),
            Err(SynthError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_synthesize() {
        // East 4, south 3, west 2
        let path = cells(&[(0, 0), (0, 4), (3, 4), (3, 2)]);

        assert_eq!(
            synthesize(&path).unwrap(),
            vec![
                Primitive::forward(Axis::A, 4),
                Primitive::TurnRight,
                Primitive::forward(Axis::B, 3),
                Primitive::TurnRight,
                Primitive::forward(Axis::A, 2),
            ]
        );

        // Diagonals are driven along their dominant axis, rows winning ties
        assert_eq!(
            synthesize(&cells(&[(0, 0), (4, 4)])).unwrap(),
            vec![Primitive::forward(Axis::B, 4)]
        );
        assert_eq!(
            synthesize(&cells(&[(0, 0), (1, 3)])).unwrap(),
            vec![Primitive::forward(Axis::A, 3)]
        );
    }

    #[test]
    fn test_synthesize_errors() {
        assert_eq!(synthesize(&cells(&[(1, 1)])), Err(SynthError::TooShort(1)));
        assert_eq!(
            synthesize(&cells(&[(1, 1), (1, 1), (1, 2)])),
            Err(SynthError::DegenerateFirstSegment(Cell::new(1, 1)))
        );
    }

    #[test]
    fn test_replay_round_trip() {
        let paths = vec![
            cells(&[(0, 0), (0, 4), (3, 4), (3, 2)]),
            cells(&[(5, 5), (2, 5), (2, 9), (2, 1)]),
            cells(&[(0, 0), (6, 0), (6, 3), (10, 3), (10, 0), (12, 0)]),
            cells(&[(4, 4), (4, 0)]),
        ];

        for p in paths {
            let commands = synthesize(&p).unwrap();
            let initial = initial_orientation(&p).unwrap();
            assert_eq!(replay(p[0], initial, &commands), p);
        }
    }
}
