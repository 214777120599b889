//! Planner side of the control session.
//!
//! [`ServerSession`] holds everything the planner knows about the connected vehicle and decides how
//! to react to operator commands and to frames from the vehicle. It performs no I/O, the server
//! thread sends whatever frames it returns.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use comms_if::{
    cmd::CommandSequence,
    frame::{Frame, REASON_NO_COMMANDS},
    session::SessionState,
};
use log::{info, warn};

use super::{OperatorCmd, OperatorError, ServerEvent, SessionStatus};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ServerSession {
    state: SessionState,

    /// Address of the connected vehicle
    peer: Option<String>,

    /// The sequence that will be sent once calibration completes
    commands: Option<CommandSequence>,

    /// Gyroscope offset reported by the last successful calibration
    calib_offset: Option<f64>,
}

/// What the server should do in response to an input.
#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    /// Frames to send to the vehicle, in order.
    pub replies: Vec<Frame>,

    /// Events to publish to the operator.
    pub events: Vec<ServerEvent>,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl ServerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Snapshot of the session for publishing to other threads.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            peer: self.peer.clone(),
            calib_offset: self.calib_offset,
            num_commands: self.commands.as_ref().map(|c| c.len()),
        }
    }

    /// A vehicle has connected.
    pub fn on_connect(&mut self, peer: String) -> Reaction {
        info!("Vehicle connected from {}", peer);
        self.peer = Some(peer.clone());
        self.calib_offset = None;

        let mut reaction = Reaction::default();
        reaction.events.push(ServerEvent::VehicleConnected(peer));
        self.set_state(SessionState::Idle, &mut reaction);
        reaction
    }

    /// The vehicle connection was lost. Any sequence held is discarded.
    pub fn on_disconnect(&mut self) -> Reaction {
        let mut reaction = Reaction::default();

        if let Some(peer) = self.peer.take() {
            info!("Vehicle {} disconnected", peer);
            reaction.events.push(ServerEvent::VehicleDisconnected(peer));
        }

        if self.commands.take().is_some() {
            info!("Discarding command sequence, a new plan is needed before the next drive");
        }
        self.calib_offset = None;

        self.set_state(SessionState::Idle, &mut reaction);
        reaction
    }

    /// Handle a command from the operator.
    pub fn on_operator(&mut self, cmd: OperatorCmd) -> Result<Reaction, OperatorError> {
        let mut reaction = Reaction::default();

        match cmd {
            OperatorCmd::SetPlan(commands) => {
                info!("New command sequence of {} primitives held", commands.len());
                self.commands = Some(commands);
            }
            OperatorCmd::Drive(source) => {
                self.check_can_drive()?;

                info!("Starting calibration with the {} profile", source);
                reaction.replies.push(Frame::Calibrate(source));
                self.set_state(SessionState::Calibrating, &mut reaction);
            }
            OperatorCmd::Stop => {
                if !self.is_connected() {
                    return Err(OperatorError::NotConnected);
                }

                reaction.replies.push(Frame::Stop);
                self.set_state(SessionState::Stopped, &mut reaction);
            }
            OperatorCmd::Shutdown => {
                if self.is_connected() {
                    reaction.replies.push(Frame::ServerShutdown);
                }
            }
        }

        Ok(reaction)
    }

    /// Handle a frame received from the vehicle.
    pub fn on_frame(&mut self, frame: Frame) -> Reaction {
        let mut reaction = Reaction::default();

        match (self.state, frame) {
            (SessionState::Calibrating, Frame::CalibrationDone(offset)) => {
                info!("Calibration complete, gyro offset {:.4}", offset);
                self.calib_offset = Some(offset);
                reaction.events.push(ServerEvent::CalibrationDone(offset));

                match &self.commands {
                    Some(c) if !c.is_empty() => {
                        reaction.replies.push(Frame::Commands(c.clone()));
                        self.set_state(SessionState::AwaitingDispatch, &mut reaction);
                    }
                    _ => {
                        warn!("Calibration complete but no commands are available");
                        reaction
                            .replies
                            .push(Frame::Error(REASON_NO_COMMANDS.to_string()));
                        self.set_state(SessionState::Idle, &mut reaction);
                    }
                }
            }
            (SessionState::Calibrating, Frame::CalibrationFail(reason)) => {
                warn!("Vehicle calibration failed: {}", reason);
                reaction.events.push(ServerEvent::CalibrationFailed(reason));
                self.set_state(SessionState::Stopped, &mut reaction);
            }
            (SessionState::AwaitingDispatch, Frame::CommandsReceivedValid) => {
                reaction.events.push(ServerEvent::SequenceAccepted);
                self.set_state(SessionState::Driving, &mut reaction);
            }
            (SessionState::AwaitingDispatch, Frame::CommandsInvalidFormat) => {
                warn!("Vehicle rejected the command sequence");
                reaction.events.push(ServerEvent::SequenceRejected);
                self.set_state(SessionState::Idle, &mut reaction);
            }
            (SessionState::Driving, Frame::SequenceDone) => {
                reaction.events.push(ServerEvent::SequenceDone);
                self.set_state(SessionState::Idle, &mut reaction);
            }
            (_, Frame::StopAck) => {
                reaction.events.push(ServerEvent::Stopped);
                self.set_state(SessionState::Idle, &mut reaction);
            }
            (_, Frame::Stop) => {
                warn!("Vehicle requested a stop");
                reaction.events.push(ServerEvent::Stopped);
                self.set_state(SessionState::Stopped, &mut reaction);
            }
            (state, frame) => {
                let msg = format!("Unexpected {:?} while {}", frame, state);
                warn!("{}, returning to Idle", msg);
                reaction.events.push(ServerEvent::ProtocolError(msg));
                self.set_state(SessionState::Idle, &mut reaction);
            }
        }

        reaction
    }

    /// A line from the vehicle could not be understood.
    pub fn on_bad_frame(&mut self, reason: String) -> Reaction {
        let mut reaction = Reaction::default();

        warn!("Rejected frame from vehicle: {}, returning to Idle", reason);
        reaction.events.push(ServerEvent::ProtocolError(reason));
        self.set_state(SessionState::Idle, &mut reaction);

        reaction
    }

    /// Checks that a drive can be started, in the same way the operator console does.
    fn check_can_drive(&self) -> Result<(), OperatorError> {
        self.status().check_can_drive()
    }

    fn set_state(&mut self, state: SessionState, reaction: &mut Reaction) {
        if state != self.state {
            info!("Session state {} -> {}", self.state, state);
            self.state = state;
            reaction.events.push(ServerEvent::StateChanged(state));
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::{
        cmd::{Axis, Primitive},
        frame::CalibSource,
    };

    fn seq() -> CommandSequence {
        vec![Primitive::forward(Axis::A, 20), Primitive::TurnLeft, Primitive::forward(Axis::B, 12)]
    }

    fn connected() -> ServerSession {
        let mut s = ServerSession::new();
        s.on_connect("127.0.0.1:4000".into());
        s
    }

    #[test]
    fn test_full_cycle() {
        let mut s = connected();
        s.on_operator(OperatorCmd::SetPlan(seq())).unwrap();

        let r = s.on_operator(OperatorCmd::Drive(CalibSource::Gallery)).unwrap();
        assert_eq!(r.replies, vec![Frame::Calibrate(CalibSource::Gallery)]);
        assert_eq!(s.state(), SessionState::Calibrating);

        let r = s.on_frame(Frame::CalibrationDone(0.25));
        assert_eq!(r.replies, vec![Frame::Commands(seq())]);
        assert_eq!(s.state(), SessionState::AwaitingDispatch);
        assert_eq!(s.status().calib_offset, Some(0.25));

        s.on_frame(Frame::CommandsReceivedValid);
        assert_eq!(s.state(), SessionState::Driving);

        let r = s.on_frame(Frame::SequenceDone);
        assert!(r.events.contains(&ServerEvent::SequenceDone));
        assert_eq!(s.state(), SessionState::Idle);

        // The sequence is kept for another run
        assert!(s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).is_ok());
    }

    #[test]
    fn test_drive_gating() {
        let mut s = ServerSession::new();
        assert_eq!(
            s.on_operator(OperatorCmd::Drive(CalibSource::Camera)),
            Err(OperatorError::NotConnected)
        );

        s.on_connect("peer".into());
        assert_eq!(
            s.on_operator(OperatorCmd::Drive(CalibSource::Camera)),
            Err(OperatorError::NoCommands)
        );

        s.on_operator(OperatorCmd::SetPlan(vec![])).unwrap();
        assert_eq!(
            s.on_operator(OperatorCmd::Drive(CalibSource::Camera)),
            Err(OperatorError::NoCommands)
        );

        s.on_operator(OperatorCmd::SetPlan(seq())).unwrap();
        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();
        assert_eq!(
            s.on_operator(OperatorCmd::Drive(CalibSource::Camera)),
            Err(OperatorError::Busy(SessionState::Calibrating))
        );
    }

    #[test]
    fn test_calibration_fail_allows_dispatch() {
        let mut s = connected();
        s.on_operator(OperatorCmd::SetPlan(seq())).unwrap();
        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();

        let r = s.on_frame(Frame::CalibrationFail("MPU_INIT_ERROR".into()));
        assert!(r.replies.is_empty());
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).is_ok());
    }

    #[test]
    fn test_no_commands_after_calibration() {
        let mut s = connected();
        s.on_operator(OperatorCmd::SetPlan(seq())).unwrap();
        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();

        // The plan is replaced by an empty one while calibrating
        s.on_operator(OperatorCmd::SetPlan(vec![])).unwrap();

        let r = s.on_frame(Frame::CalibrationDone(0.0));
        assert_eq!(r.replies, vec![Frame::Error(REASON_NO_COMMANDS.into())]);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_unexpected_and_invalid() {
        let mut s = connected();
        s.on_operator(OperatorCmd::SetPlan(seq())).unwrap();

        let r = s.on_frame(Frame::SequenceDone);
        assert!(matches!(r.events[0], ServerEvent::ProtocolError(_)));
        assert_eq!(s.state(), SessionState::Idle);

        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();
        s.on_frame(Frame::CalibrationDone(0.1));
        s.on_frame(Frame::CommandsInvalidFormat);
        assert_eq!(s.state(), SessionState::Idle);

        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();
        s.on_bad_frame("garbage".into());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.is_connected());
    }

    #[test]
    fn test_stop_and_disconnect() {
        let mut s = connected();
        s.on_operator(OperatorCmd::SetPlan(seq())).unwrap();
        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();
        s.on_frame(Frame::CalibrationDone(0.1));
        s.on_frame(Frame::CommandsReceivedValid);

        let r = s.on_operator(OperatorCmd::Stop).unwrap();
        assert_eq!(r.replies, vec![Frame::Stop]);
        assert_eq!(s.state(), SessionState::Stopped);

        s.on_frame(Frame::StopAck);
        assert_eq!(s.state(), SessionState::Idle);

        // Disconnecting drops the sequence
        s.on_operator(OperatorCmd::Drive(CalibSource::Camera)).unwrap();
        s.on_disconnect();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.status().num_commands, None);

        s.on_connect("peer".into());
        assert_eq!(
            s.on_operator(OperatorCmd::Drive(CalibSource::Camera)),
            Err(OperatorError::NoCommands)
        );
        assert_eq!(
            ServerSession::new().on_operator(OperatorCmd::Stop),
            Err(OperatorError::NotConnected)
        );
    }
}
