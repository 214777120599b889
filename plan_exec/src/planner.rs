//! # Planner
//!
//! Runs the full planning pipeline for a pair of cells: pathfinding, simplification, synthesis and
//! optimisation. The result of every successful plan is a [`Plan`], which is regenerated in full
//! each time and never patched.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::cmd::{self, CommandSequence};
use log::{error, info};
use serde::Deserialize;
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use crate::{
    grid::{Cell, Grid},
    optimise::optimise,
    pathfinder::find_path,
    simplify::{simplify, SimplifiedPath},
    synth::{initial_orientation, synthesize, Orientation, SynthError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Planner parameters, loaded from `planner.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerParams {
    /// Forward moves shorter than this number of cells are removed from the sequence.
    pub min_forward_step: u32,

    /// Name of the file the rendering of each plan is saved to, inside the session directory.
    pub directions_file: String,
}

pub struct Planner {
    params: PlannerParams,
}

/// The output of a successful plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Number of cells in the path found by the search.
    pub pixel_path_len: usize,

    /// The turn points of the path.
    pub simplified: SimplifiedPath,

    /// Heading the vehicle is assumed to start with.
    pub initial_heading: Orientation,

    /// The optimised command sequence.
    pub commands: CommandSequence,

    /// Human readable form of `commands`, one line per primitive.
    pub rendering: Vec<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("The start point {0} is not on a drivable cell")]
    InvalidStart(Cell),

    #[error("The end point {0} is not on a drivable cell")]
    InvalidEnd(Cell),

    #[error("No route from {start} to {end}")]
    NoRoute { start: Cell, end: Cell },

    #[error("The path has only {0} point(s), start and end must differ")]
    PathTooShort(usize),

    #[error("Could not synthesize commands: {0}")]
    Synth(SynthError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            min_forward_step: 10,
            directions_file: "directions.txt".into(),
        }
    }
}

impl Planner {
    pub fn new(params: PlannerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PlannerParams {
        &self.params
    }

    /// Plan a command sequence between two cells.
    pub fn plan(&self, grid: &Grid, start: Cell, end: Cell) -> Result<Plan, PlanError> {
        let pixel_path = find_path(grid, start, end)?;

        let simplified = simplify(&pixel_path);
        if simplified.len() < 2 {
            return Err(PlanError::PathTooShort(simplified.len()));
        }

        let synth_result =
            initial_orientation(&simplified).and_then(|o| Ok((o, synthesize(&simplified)?)));
        let (initial_heading, raw) = match synth_result {
            Ok(r) => r,
            Err(e) => {
                error!("Synthesis failed for path {} -> {}: {}", start, end, e);
                return Err(PlanError::Synth(e));
            }
        };

        let commands = optimise(&raw, self.params.min_forward_step);
        let rendering = cmd::render(&commands);

        info!(
            "Planned {} -> {}: {} cells, {} turn points, {} raw commands, {} optimised",
            start,
            end,
            pixel_path.len(),
            simplified.len(),
            raw.len(),
            commands.len()
        );

        Ok(Plan {
            pixel_path_len: pixel_path.len(),
            simplified,
            initial_heading,
            commands,
            rendering,
        })
    }
}

impl Plan {
    /// Returns true if the plan holds at least one command to send to the vehicle.
    pub fn is_dispatchable(&self) -> bool {
        !self.commands.is_empty()
    }

    /// Write the human readable rendering to a file, one primitive per line.
    pub fn save_rendering<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = fs::File::create(path)?;

        for line in &self.rendering {
            writeln!(file, "{}", line)?;
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
