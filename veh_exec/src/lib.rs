//! # Vehicle library
//!
//! The vehicle side of the maze driving system. The [`client::VehClient`] keeps a connection to
//! the planner, over which a [`vehicle::Vehicle`] calibrates its gyroscope and executes command
//! sequences on whatever hardware implements the traits in [`hw`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Gyroscope bias calibration
pub mod calib;

/// Reconnecting TCP client
pub mod client;

/// Command sequence execution
pub mod executor;

/// Closed loop turns
pub mod heading_ctrl;

/// Hardware traits
pub mod hw;

/// Vehicle parameters
pub mod params;

/// PID controller
pub mod pid;

/// Simulated hardware
pub mod sim;

/// Vehicle side control session
pub mod vehicle;
