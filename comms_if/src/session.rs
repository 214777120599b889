//! # Control session states
//!
//! Both parties of a control session track the same small set of states. Anything the operator is
//! or is not allowed to do is derived from the current state rather than from separate flags.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// State of a control session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No calibration or sequence in progress.
    Idle,

    /// The vehicle is sampling its gyroscope to measure the bias offset.
    Calibrating,

    /// Calibration is complete and a sequence is being handed over.
    AwaitingDispatch,

    /// The vehicle is executing a sequence.
    Driving,

    /// Calibration failed or a stop was requested.
    Stopped,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SessionState {
    /// Returns true while the vehicle is doing something which a `STOP` would interrupt.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Calibrating | SessionState::AwaitingDispatch | SessionState::Driving
        )
    }

    /// Returns true if a new calibrate and drive cycle may be started from this state.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "Idle",
            SessionState::Calibrating => "Calibrating",
            SessionState::AwaitingDispatch => "AwaitingDispatch",
            SessionState::Driving => "Driving",
            SessionState::Stopped => "Stopped",
        };
        write!(f, "{}", s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dispatch_gating() {
        assert!(SessionState::Idle.can_dispatch());
        assert!(SessionState::Stopped.can_dispatch());
        assert!(!SessionState::Calibrating.can_dispatch());
        assert!(!SessionState::Driving.can_dispatch());

        assert!(SessionState::Driving.is_busy());
        assert!(!SessionState::Stopped.is_busy());
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}
