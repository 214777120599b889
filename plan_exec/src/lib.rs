//! # Planner library
//!
//! Everything the planner executable needs, from the traversability grid through to the server
//! which dispatches command sequences to the vehicle.
//!
//! Planning flows one way: grid -> [`pathfinder`] -> [`simplify`] -> [`synth`] -> [`optimise`],
//! wrapped up by the [`planner::Planner`]. The resulting sequence is handed to the
//! [`server::PlanServer`] for dispatch.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Binary traversability grid
pub mod grid;

/// Command optimisation passes
pub mod optimise;

/// Breadth-first grid search
pub mod pathfinder;

/// Full planning pipeline
pub mod planner;

/// TCP server and planner side control session
pub mod server;

/// Path simplification
pub mod simplify;

/// Conversion of paths into motion primitives
pub mod synth;
