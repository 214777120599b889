//! # Vehicle control session
//!
//! The vehicle side of the control session. A [`Vehicle`] owns the hardware and runs one session
//! per connection to the planner, reacting to each frame in turn. Calibration, sequence execution
//! and the celebration all run inline on the session thread, checking for STOP as they go.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    cmd::CommandSequence,
    frame::{CalibSource, Frame, FrameParseError},
    net::{Link, NetError},
    session::SessionState,
};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::{
    calib::{self, CalibError, CalibOutcome},
    executor::{ExecOutcome, Executor},
    hw::{ActuationError, Gyro, GyroError, MotorDriver, StatusLed},
    params::VehicleParams,
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VehicleError {
    #[error("Actuation failed: {0}")]
    Actuation(#[from] ActuationError),

    #[error("Gyroscope error: {0}")]
    Gyro(#[from] GyroError),

    #[error(transparent)]
    Calib(#[from] CalibError),

    #[error("Link to the planner failed: {0}")]
    Link(#[from] NetError),

    #[error("The planner shut down")]
    ServerShutdown,
}

/// Why a session with the planner ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection was closed or failed.
    Disconnected,

    /// The planner sent `SERVER_SHUTDOWN`.
    ServerShutdown,

    /// The planner was already serving another vehicle.
    Busy,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A completed gyroscope calibration.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Calibration {
    pub source: CalibSource,
    pub offset_dps: f64,
}

pub struct Vehicle<M, G, S> {
    motor: M,
    gyro: G,
    led: S,

    params: VehicleParams,

    state: SessionState,

    /// True once the gyroscope has been initialised, cleared on STOP or a gyroscope fault.
    gyro_ready: bool,

    calib: Option<Calibration>,

    /// Frame received while finishing an action, to be handled next.
    deferred: Option<Frame>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<M, G, S> Vehicle<M, G, S>
where
    M: MotorDriver,
    G: Gyro,
    S: StatusLed,
{
    pub fn new(motor: M, gyro: G, led: S, params: VehicleParams) -> Self {
        Self {
            motor,
            gyro,
            led,
            params,
            state: SessionState::Idle,
            gyro_ready: false,
            calib: None,
            deferred: None,
        }
    }

    /// Run a session over the given link until it ends.
    ///
    /// Link failures, `BUSY` and `SERVER_SHUTDOWN` end the session normally. Actuation errors are
    /// returned after the motors have been stopped.
    pub fn run_session<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
    ) -> Result<SessionEnd, VehicleError> {
        info!("Session started");
        self.set_state(SessionState::Idle);
        self.deferred = None;

        let result = match self.led.set_duty(self.params.connected_led_duty) {
            Ok(()) => self.session_loop(link),
            Err(e) => Err(e.into()),
        };

        // Nothing may keep moving once the session is over
        self.force_stop();
        self.set_state(SessionState::Idle);

        match result {
            Ok(end) => {
                info!("Session ended: {:?}", end);
                Ok(end)
            }
            Err(VehicleError::ServerShutdown) => {
                info!("Session ended: planner shut down");
                Ok(SessionEnd::ServerShutdown)
            }
            Err(VehicleError::Link(e)) => {
                warn!("Session ended: {}", e);
                Ok(SessionEnd::Disconnected)
            }
            Err(e) => {
                error!("Session aborted: {}", e);
                Err(e)
            }
        }
    }

    fn session_loop<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
    ) -> Result<SessionEnd, VehicleError> {
        loop {
            let received = match self.deferred.take() {
                Some(f) => Ok(Some(f)),
                None => link.recv(self.params.stop_poll()),
            };

            let frame = match received {
                Ok(Some(f)) => f,
                Ok(None) => continue,
                Err(NetError::BadFrame(FrameParseError::InvalidCommands(e))) => {
                    self.on_invalid_commands(link, &e.to_string())?;
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("Ignoring unreadable frame: {}", e);
                    continue;
                }
            };

            match frame {
                Frame::Calibrate(source) => self.on_calibrate(source, link)?,
                Frame::Commands(seq) => self.on_commands(seq, link)?,
                Frame::Stop => self.on_stop(link)?,
                Frame::ServerShutdown => return Ok(SessionEnd::ServerShutdown),
                Frame::Busy => {
                    warn!("The planner is busy with another vehicle");
                    return Ok(SessionEnd::Busy);
                }
                Frame::Error(reason) => {
                    warn!("The planner reported an error: {}", reason);
                    self.set_state(SessionState::Idle);
                }
                other => self.reset_to_idle(&other.to_string()),
            }
        }
    }

    fn on_calibrate<L: Link + ?Sized>(
        &mut self,
        source: CalibSource,
        link: &mut L,
    ) -> Result<(), VehicleError> {
        // The planner only calibrates from Idle, so a CALIBRATE here means it reset after a
        // message we never saw. Follow it back to Idle and answer the calibration.
        if !self.state.can_dispatch() {
            self.reset_to_idle("CALIBRATE");
            self.calib = None;
        }

        self.set_state(SessionState::Calibrating);
        self.calib = None;
        info!("Calibrating for {} images", source);

        if !self.gyro_ready {
            if let Err(e) = calib::init_gyro(&mut self.gyro) {
                return self.fail_calibration(link, e);
            }
            self.gyro_ready = true;
        }

        match calib::measure_offset(&mut self.gyro, link, &self.params) {
            Ok(CalibOutcome::Done(offset_dps)) => {
                self.calib = Some(Calibration { source, offset_dps });
                link.send(&Frame::CalibrationDone(offset_dps))?;
                self.set_state(SessionState::AwaitingDispatch);
                Ok(())
            }
            Ok(CalibOutcome::Stopped) => self.on_stop(link),
            Err(VehicleError::Calib(e)) => {
                self.gyro_ready = false;
                self.fail_calibration(link, e)
            }
            Err(e) => Err(e),
        }
    }

    fn fail_calibration<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        err: CalibError,
    ) -> Result<(), VehicleError> {
        error!("{}", err);
        link.send(&Frame::CalibrationFail(err.reason().into()))?;
        self.set_state(SessionState::Stopped);
        Ok(())
    }

    fn on_invalid_commands<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        reason: &str,
    ) -> Result<(), VehicleError> {
        if self.state != SessionState::AwaitingDispatch {
            self.reset_to_idle(&format!("malformed COMMANDS ({})", reason));
            return Ok(());
        }

        warn!("Rejecting COMMANDS: {}", reason);
        link.send(&Frame::CommandsInvalidFormat)?;
        self.set_state(SessionState::Idle);
        Ok(())
    }

    fn on_commands<L: Link + ?Sized>(
        &mut self,
        seq: CommandSequence,
        link: &mut L,
    ) -> Result<(), VehicleError> {
        if self.state != SessionState::AwaitingDispatch {
            self.reset_to_idle("COMMANDS");
            return Ok(());
        }

        if seq.is_empty() {
            return self.on_invalid_commands(link, "empty sequence");
        }

        link.send(&Frame::CommandsReceivedValid)?;
        self.set_state(SessionState::Driving);

        let source = self.calib.map(|c| c.source).unwrap_or_default();
        let offset = self.calib.map(|c| c.offset_dps);

        let (outcome, offset_after) = {
            let mut exec = Executor::new(
                &mut self.motor,
                &mut self.gyro,
                &self.params,
                self.params.profile(source),
                offset,
            );
            let outcome = exec.run(&seq, link)?;
            (outcome, exec.offset_dps())
        };

        if offset.is_some() && offset_after.is_none() {
            warn!("Calibration invalidated by a gyroscope fault");
            self.calib = None;
            self.gyro_ready = false;
        }

        match outcome {
            ExecOutcome::Completed => {
                link.send(&Frame::SequenceDone)?;
                self.set_state(SessionState::Idle);
                self.celebrate(link)
            }
            ExecOutcome::Stopped => self.on_stop(link),
        }
    }

    fn on_stop<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<(), VehicleError> {
        info!("STOP received while {}", self.state);

        self.motor.stop()?;
        self.led.set_duty(0.0)?;
        self.gyro_ready = false;

        link.send(&Frame::StopAck)?;
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Flash the LED after a completed sequence.
    ///
    /// The vehicle is already idle, so any frame other than STOP ends the celebration early and is
    /// handled by the session loop.
    fn celebrate<L: Link + ?Sized>(&mut self, link: &mut L) -> Result<(), VehicleError> {
        let start = Instant::now();
        let mut lit = false;

        while start.elapsed() < self.params.celebrate_duration() {
            lit = !lit;
            self.led.set_duty(if lit { 100.0 } else { 0.0 })?;

            match link.recv(self.params.celebrate_interval()) {
                Ok(Some(Frame::Stop)) => return self.on_stop(link),
                Ok(Some(frame)) => {
                    debug!("Celebration cut short by {}", frame);
                    self.deferred = Some(frame);
                    break;
                }
                Ok(None) => (),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!("Ignoring unreadable frame: {}", e),
            }
        }

        self.led.set_duty(self.params.connected_led_duty)?;
        Ok(())
    }

    /// Drop back to Idle after a message that is not valid in the current state.
    ///
    /// Nothing is sent back, the connection stays up and the planner is expected to start over
    /// with a new CALIBRATE.
    fn reset_to_idle(&mut self, what: &str) {
        warn!("Unexpected {} while {}, returning to {}", what, self.state, SessionState::Idle);

        if matches!(self.state, SessionState::Calibrating | SessionState::Driving) {
            self.force_stop();
        }

        self.set_state(SessionState::Idle);
    }

    /// Stop the motors and turn off the LED, logging rather than returning failures.
    fn force_stop(&mut self) {
        if let Err(e) = self.motor.stop() {
            error!("Could not stop the motors: {}", e);
        }
        if let Err(e) = self.led.set_duty(0.0) {
            warn!("Could not turn off the status LED: {}", e);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Vehicle state: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Wait up to `timeout` for a STOP from the planner.
///
/// Returns `Ok(true)` if a STOP arrived. Other frames are logged and dropped, since nothing but a
/// STOP may interrupt an action in progress. `SERVER_SHUTDOWN` and link failures end the action
/// with an error.
pub fn poll_stop<L: Link + ?Sized>(link: &mut L, timeout: Duration) -> Result<bool, VehicleError> {
    match link.recv(timeout) {
        Ok(Some(Frame::Stop)) => Ok(true),
        Ok(Some(Frame::ServerShutdown)) => Err(VehicleError::ServerShutdown),
        Ok(Some(other)) => {
            warn!("Ignoring {} while busy", other);
            Ok(false)
        }
        Ok(None) => Ok(false),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            warn!("Ignoring unreadable frame while busy: {}", e);
            Ok(false)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        sim::{SimBody, SimParams, SimSnapshot},
        testing::loopback_pair,
    };
    use comms_if::{
        cmd::{Axis, Primitive},
        frame::REASON_GYRO_INIT,
        net::LineStream,
    };
    use std::thread::{self, JoinHandle};

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_params() -> VehicleParams {
        VehicleParams {
            calib_duration_s: 0.2,
            inter_cmd_poll_ms: 10,
            celebrate_duration_s: 0.1,
            celebrate_interval_s: 0.02,
            ..Default::default()
        }
    }

    /// Start a vehicle session on its own thread, returning the planner's end of the link.
    fn start(
        sim: SimParams,
        params: VehicleParams,
    ) -> (
        SimBody,
        LineStream,
        JoinHandle<Result<SessionEnd, VehicleError>>,
    ) {
        let body = SimBody::new(sim);
        let mut vehicle = Vehicle::new(body.motor(), body.gyro(), body.led(), params);
        let (planner, mut veh_link) = loopback_pair();

        let handle = thread::spawn(move || vehicle.run_session(&mut veh_link));

        (body, planner, handle)
    }

    fn expect(planner: &mut LineStream, frame: Frame) {
        assert_eq!(planner.recv(WAIT).unwrap(), Some(frame));
    }

    fn finish(
        mut planner: LineStream,
        handle: JoinHandle<Result<SessionEnd, VehicleError>>,
    ) -> SessionEnd {
        planner.send(&Frame::ServerShutdown).unwrap();
        handle.join().unwrap().unwrap()
    }

    fn calibrate(planner: &mut LineStream, source: CalibSource) -> f64 {
        planner.send(&Frame::Calibrate(source)).unwrap();
        match planner.recv(Duration::from_secs(10)).unwrap() {
            Some(Frame::CalibrationDone(o)) => o,
            f => panic!("Expected CALIBRATION_DONE, got {:?}", f),
        }
    }

    #[test]
    fn test_drive_cycle() {
        let (body, mut planner, handle) = start(
            SimParams {
                gyro_bias_dps: 0.25,
                ..Default::default()
            },
            fast_params(),
        );

        let offset = calibrate(&mut planner, CalibSource::Gallery);
        assert!((offset - 0.25).abs() < 1e-9);

        let seq = vec![
            Primitive::forward(Axis::A, 2),
            Primitive::TurnLeft,
            Primitive::forward(Axis::B, 2),
        ];
        planner.send(&Frame::Commands(seq)).unwrap();

        expect(&mut planner, Frame::CommandsReceivedValid);
        expect(&mut planner, Frame::SequenceDone);

        assert_eq!(finish(planner, handle), SessionEnd::ServerShutdown);

        let SimSnapshot {
            heading_deg,
            distance,
            led_duty,
            led_changes,
            ..
        } = body.snapshot();
        assert!((heading_deg - 90.0).abs() < 2.0);
        assert!(distance > 0.0);
        assert!(led_changes > 3);
        assert_eq!(led_duty, 0.0);
    }

    #[test]
    fn test_invalid_commands() {
        let (_body, mut planner, handle) = start(SimParams::default(), fast_params());

        // Before calibration commands get no reply
        planner.send_line("COMMANDS:[[\"forward_a\", 5]]").unwrap();
        assert_eq!(planner.recv(Duration::from_millis(200)).unwrap(), None);

        calibrate(&mut planner, CalibSource::Camera);
        planner.send_line("COMMANDS:[[\"reverse\", 5]]").unwrap();
        expect(&mut planner, Frame::CommandsInvalidFormat);

        // The rejection leaves the vehicle idle, so a valid sequence now needs a new calibration
        planner.send(&Frame::Commands(vec![Primitive::TurnLeft])).unwrap();
        assert_eq!(planner.recv(Duration::from_millis(200)).unwrap(), None);

        calibrate(&mut planner, CalibSource::Camera);
        planner.send(&Frame::Commands(vec![])).unwrap();
        expect(&mut planner, Frame::CommandsInvalidFormat);

        assert_eq!(finish(planner, handle), SessionEnd::ServerShutdown);
    }

    #[test]
    fn test_unexpected_frame_returns_to_idle() {
        let (body, mut planner, handle) = start(SimParams::default(), fast_params());
        let seq = vec![Primitive::forward(Axis::A, 1)];

        calibrate(&mut planner, CalibSource::Camera);

        // A frame only the vehicle sends drops it back to idle without a reply
        planner.send(&Frame::SequenceDone).unwrap();
        assert_eq!(planner.recv(Duration::from_millis(200)).unwrap(), None);

        // Idle, so commands are not accepted until the next calibration
        planner.send(&Frame::Commands(seq.clone())).unwrap();
        assert_eq!(planner.recv(Duration::from_millis(200)).unwrap(), None);
        assert_eq!(body.snapshot().distance, 0.0);

        calibrate(&mut planner, CalibSource::Camera);

        // A planner that reset on its own side calibrates again before dispatching, which is
        // answered even though the vehicle was still waiting for commands
        calibrate(&mut planner, CalibSource::Gallery);

        planner.send(&Frame::Commands(seq)).unwrap();
        expect(&mut planner, Frame::CommandsReceivedValid);
        expect(&mut planner, Frame::SequenceDone);

        assert_eq!(finish(planner, handle), SessionEnd::ServerShutdown);
        assert!(body.snapshot().distance > 0.0);
    }

    #[test]
    fn test_gyro_init_failure() {
        let (body, mut planner, handle) = start(
            SimParams {
                gyro_init_fails: true,
                ..Default::default()
            },
            fast_params(),
        );

        planner.send(&Frame::Calibrate(CalibSource::Camera)).unwrap();
        expect(&mut planner, Frame::CalibrationFail(REASON_GYRO_INIT.into()));

        // Recovered sensor is initialised on the next attempt
        body.set_gyro_init_fails(false);
        calibrate(&mut planner, CalibSource::Camera);
        assert_eq!(body.snapshot().gyro_inits, 1);

        assert_eq!(finish(planner, handle), SessionEnd::ServerShutdown);
    }

    #[test]
    fn test_stop_during_calibration() {
        let (body, mut planner, handle) = start(
            SimParams::default(),
            VehicleParams {
                calib_duration_s: 5.0,
                ..fast_params()
            },
        );

        planner.send(&Frame::Calibrate(CalibSource::Camera)).unwrap();
        thread::sleep(Duration::from_millis(100));
        planner.send(&Frame::Stop).unwrap();

        // The acknowledgement is the only reply, the offset is never sent
        expect(&mut planner, Frame::StopAck);
        assert_eq!(planner.recv(Duration::from_millis(300)).unwrap(), None);

        // STOP uninitialises the gyroscope, so calibrating again initialises it again
        calibrate(&mut planner, CalibSource::Camera);
        assert_eq!(body.snapshot().gyro_inits, 2);

        assert_eq!(finish(planner, handle), SessionEnd::ServerShutdown);
    }

    #[test]
    fn test_disconnect() {
        let (body, planner, handle) = start(SimParams::default(), fast_params());

        thread::sleep(Duration::from_millis(100));
        assert_eq!(body.snapshot().led_duty, 50.0);

        drop(planner);
        assert_eq!(handle.join().unwrap().unwrap(), SessionEnd::Disconnected);

        let snap = body.snapshot();
        assert_eq!(snap.led_duty, 0.0);
        assert!(snap.stop_calls >= 1);
    }

    #[test]
    fn test_busy() {
        let (_body, mut planner, handle) = start(SimParams::default(), fast_params());
        planner.send(&Frame::Busy).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), SessionEnd::Busy);
    }
}
