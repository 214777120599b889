//! # Communications interface crate.
//!
//! Provides everything the planner and the vehicle need to agree on: the motion primitive
//! vocabulary, the text frames exchanged during a control session, the session states, and the
//! line-framed TCP transport.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Motion primitives and their wire encoding
pub mod cmd;

/// Protocol frames exchanged between planner and vehicle
pub mod frame;

/// Network module
pub mod net;

/// Control session states
pub mod session;
