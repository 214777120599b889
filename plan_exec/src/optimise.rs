//! # Command optimiser
//!
//! A fixed pipeline of rewrite passes over a command sequence:
//!
//! 1. [`consolidate`] consecutive forward moves along the same axis
//! 2. [`filter_short`] forward moves below the minimum step
//! 3. [`consolidate`] again, filtering may have made forwards adjacent
//! 4. [`cancel_opposing`] turn pairs
//! 5. [`consolidate`] a final time
//! 6. [`trim_boundary`] turns at the start and end of the sequence
//!
//! Every pass takes its input by reference and returns a new sequence.
//!
//! Filtering can leave two turns next to each other with nothing between them. Such turns are
//! kept as they are, cancellation only removes directly opposing pairs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::{CommandSequence, Primitive};
use log::debug;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the full optimisation pipeline.
pub fn optimise(commands: &[Primitive], min_forward_step: u32) -> CommandSequence {
    let seq = consolidate(commands);
    debug!("Consolidation: {} -> {} commands", commands.len(), seq.len());

    let seq = filter_short(&seq, min_forward_step);
    debug!("Short forward filter (< {}): {} commands", min_forward_step, seq.len());

    let seq = consolidate(&seq);
    debug!("Re-consolidation: {} commands", seq.len());

    let seq = cancel_opposing(&seq);
    debug!("Opposing turn cancellation: {} commands", seq.len());

    let seq = consolidate(&seq);
    debug!("Final consolidation: {} commands", seq.len());

    let seq = trim_boundary(&seq);
    debug!("Boundary trim: {} commands", seq.len());

    seq
}

/// Merge runs of forward moves along the same axis into a single move. Turns are never merged.
pub fn consolidate(commands: &[Primitive]) -> CommandSequence {
    let mut out: CommandSequence = Vec::with_capacity(commands.len());

    for cmd in commands {
        if let Primitive::Forward { axis, magnitude } = cmd {
            if let Some(Primitive::Forward {
                axis: prev_axis,
                magnitude: prev_mag,
            }) = out.last_mut()
            {
                if *prev_axis == *axis {
                    *prev_mag = prev_mag.saturating_add(*magnitude);
                    continue;
                }
            }
        }

        out.push(*cmd);
    }

    out
}

/// Drop forward moves shorter than `min_step`. Turns always pass through.
pub fn filter_short(commands: &[Primitive], min_step: u32) -> CommandSequence {
    commands
        .iter()
        .filter(|c| match c {
            Primitive::Forward { magnitude, .. } => *magnitude >= min_step,
            _ => true,
        })
        .copied()
        .collect()
}

/// Remove each left/right turn pair which are directly next to each other.
///
/// This is a single left to right scan. Once a pair is removed the scan continues after it, so
/// turns which become adjacent through a removal are not themselves cancelled. For example
/// `[R, L, R]` becomes `[R]`, and `[R, L, L, R]` becomes `[]` only because both pairs were
/// adjacent in the input.
pub fn cancel_opposing(commands: &[Primitive]) -> CommandSequence {
    let mut out = Vec::with_capacity(commands.len());
    let mut i = 0;

    while i < commands.len() {
        if i + 1 < commands.len() && opposing(&commands[i], &commands[i + 1]) {
            i += 2;
        } else {
            out.push(commands[i]);
            i += 1;
        }
    }

    out
}

/// Drop a turn at the start of the sequence and a turn at the end of it.
pub fn trim_boundary(commands: &[Primitive]) -> CommandSequence {
    let mut slice = commands;

    if let Some((first, rest)) = slice.split_first() {
        if first.is_turn() {
            slice = rest;
        }
    }
    if let Some((last, rest)) = slice.split_last() {
        if last.is_turn() {
            slice = rest;
        }
    }

    slice.to_vec()
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn opposing(a: &Primitive, b: &Primitive) -> bool {
    matches!(
        (a, b),
        (Primitive::TurnLeft, Primitive::TurnRight) | (Primitive::TurnRight, Primitive::TurnLeft)
    )
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::cmd::Axis;
    use comms_if::cmd::Primitive::{TurnLeft as L, TurnRight as R};

    fn fa(m: u32) -> Primitive {
        Primitive::forward(Axis::A, m)
    }

    fn fb(m: u32) -> Primitive {
        Primitive::forward(Axis::B, m)
    }

    #[test]
    fn test_consolidate() {
        let seq = vec![fa(3), fa(4), fb(1), fb(2), R, R, fb(5), fb(5), fa(1)];
        let once = consolidate(&seq);

        assert_eq!(once, vec![fa(7), fb(3), R, R, fb(10), fa(1)]);
        assert_eq!(consolidate(&once), once);
        assert_eq!(consolidate(&[]), vec![]);
    }

    #[test]
    fn test_filter_short() {
        assert_eq!(
            filter_short(&[fa(9), L, fb(10), R, fa(11)], 10),
            vec![L, fb(10), R, fa(11)]
        );
    }

    #[test]
    fn test_cancel_single_pass() {
        assert_eq!(cancel_opposing(&[R, L, R]), vec![R]);
        assert_eq!(cancel_opposing(&[L, R, L]), vec![L]);
        assert_eq!(cancel_opposing(&[R, L, L, R]), vec![]);

        // Only directly adjacent pairs in the input cancel
        assert_eq!(cancel_opposing(&[L, L, R, R]), vec![L, R]);
        assert_eq!(cancel_opposing(&[R, fa(20), L]), vec![R, fa(20), L]);
        assert_eq!(cancel_opposing(&[R, R]), vec![R, R]);
    }

    #[test]
    fn test_trim_boundary() {
        assert_eq!(trim_boundary(&[L, fa(20), R]), vec![fa(20)]);
        assert_eq!(trim_boundary(&[R, R, fb(20)]), vec![R, fb(20)]);
        assert_eq!(trim_boundary(&[L]), vec![]);
        assert_eq!(trim_boundary(&[]), vec![]);
    }

    #[test]
    fn test_optimise_threshold() {
        assert_eq!(optimise(&[fa(3), fa(2), R, L, fb(15)], 10), vec![fb(15)]);
    }

    #[test]
    fn test_optimise_adjacent_turns_kept() {
        // The short forward between the turns is filtered, the turns are not merged
        assert_eq!(
            optimise(&[fb(30), R, fa(4), R, fb(30)], 10),
            vec![fb(30), R, R, fb(30)]
        );

        // Filtering joins the two vertical moves back together
        assert_eq!(
            optimise(&[fb(30), R, fa(4), L, fb(30)], 10),
            vec![fb(60)]
        );
    }
}
