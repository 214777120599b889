//! # Heading controller
//!
//! Closed loop turns on the spot. The yaw rate from the gyroscope, less the calibrated bias, is
//! integrated into a heading estimate which a [`PidController`] drives onto the target.
//!
//! A turn ends when the vehicle has settled on the target, when the turn timeout elapses, or when
//! a STOP arrives from the planner. However the turn ends the motors are stopped exactly once.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::Link;
use log::{info, trace, warn};
use std::{
    thread,
    time::{Duration, Instant},
};
use util::maths::clamp;

use crate::{
    hw::{Gyro, MotorAction, MotorDriver},
    params::VehicleParams,
    pid::PidController,
    vehicle::{poll_stop, VehicleError},
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Why a turn ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The heading stayed within tolerance for the required number of ticks.
    Settled,

    /// The turn timeout elapsed first.
    TimedOut,

    /// A STOP was received.
    Aborted,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,

    /// Heading change achieved, anticlockwise positive.
    pub angle_deg: f64,

    /// Remaining error when the turn ended.
    pub error_deg: f64,

    pub ticks: u32,

    pub elapsed: Duration,
}

/// Running state of a single turn.
struct TurnState {
    angle_deg: f64,
    error_deg: f64,
    ticks: u32,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Turn the vehicle by `target_deg` (anticlockwise positive) using the gyroscope bias `offset_dps`.
pub fn turn<M, G, L>(
    motor: &mut M,
    gyro: &mut G,
    link: &mut L,
    params: &VehicleParams,
    target_deg: f64,
    offset_dps: f64,
) -> Result<TurnReport, VehicleError>
where
    M: MotorDriver + ?Sized,
    G: Gyro + ?Sized,
    L: Link + ?Sized,
{
    let start = Instant::now();
    let mut state = TurnState {
        angle_deg: 0.0,
        error_deg: target_deg,
        ticks: 0,
    };

    let result = run_loop(
        motor,
        gyro,
        link,
        params,
        target_deg,
        offset_dps,
        start,
        &mut state,
    );

    // Stop once, whatever ended the loop
    let stop_result = motor.stop();

    let outcome = match (result, stop_result) {
        (Ok(o), Ok(())) => o,
        (Ok(_), Err(e)) => return Err(VehicleError::Actuation(e)),
        (Err(e), Ok(())) => return Err(e),
        (Err(e), Err(stop_err)) => {
            warn!("Could not stop motors after a failed turn: {}", stop_err);
            return Err(e);
        }
    };

    let report = TurnReport {
        outcome,
        angle_deg: state.angle_deg,
        error_deg: state.error_deg,
        ticks: state.ticks,
        elapsed: start.elapsed(),
    };

    match outcome {
        TurnOutcome::Settled => info!(
            "Turn of {:.1} deg settled at {:.2} deg after {:.2} s ({} ticks)",
            target_deg,
            report.angle_deg,
            report.elapsed.as_secs_f64(),
            report.ticks
        ),
        TurnOutcome::TimedOut => warn!(
            "Turn of {:.1} deg timed out at {:.2} deg (error {:.2} deg)",
            target_deg, report.angle_deg, report.error_deg
        ),
        TurnOutcome::Aborted => info!(
            "Turn of {:.1} deg aborted by STOP at {:.2} deg",
            target_deg, report.angle_deg
        ),
    }

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn run_loop<M, G, L>(
    motor: &mut M,
    gyro: &mut G,
    link: &mut L,
    params: &VehicleParams,
    target_deg: f64,
    offset_dps: f64,
    start: Instant,
    state: &mut TurnState,
) -> Result<TurnOutcome, VehicleError>
where
    M: MotorDriver + ?Sized,
    G: Gyro + ?Sized,
    L: Link + ?Sized,
{
    let mut pid = PidController::from_params(params);
    let timeout = params.turn_timeout();
    let tolerance = params.angle_tolerance_deg;

    let mut prev_tick = start;
    let mut last_poll = start;
    let mut on_target_ticks = 0;

    loop {
        thread::sleep(params.control_period());

        let now = Instant::now();
        if now - start >= timeout {
            return Ok(TurnOutcome::TimedOut);
        }

        let dt = (now - prev_tick).as_secs_f64();
        prev_tick = now;

        let rate = gyro.rate_dps().map_err(VehicleError::Gyro)? - offset_dps;
        state.angle_deg += rate * dt;
        state.error_deg = target_deg - state.angle_deg;
        state.ticks += 1;

        let output = pid.update(state.error_deg, dt);

        let (action, speed) = if state.error_deg.abs() > tolerance
            && output.abs() > params.output_deadband
        {
            let action = if output > 0.0 {
                MotorAction::SpinLeft
            } else {
                MotorAction::SpinRight
            };
            let speed = clamp(
                &output.abs(),
                &params.min_effective_output,
                &params.max_output,
            );
            (action, speed)
        } else {
            (MotorAction::Hold, 0.0)
        };

        motor.drive(action, speed)?;

        trace!(
            "turn: angle {:.3} error {:.3} output {:.2} -> {:?} {:.1}",
            state.angle_deg,
            state.error_deg,
            output,
            action,
            speed
        );

        if state.error_deg.abs() < tolerance {
            on_target_ticks += 1;

            if on_target_ticks >= params.settle_ticks
                && output.abs() < params.min_effective_output
            {
                return Ok(TurnOutcome::Settled);
            }
        } else {
            on_target_ticks = 0;
        }

        if now - last_poll >= params.stop_poll() {
            last_poll = now;
            if poll_stop(link, Duration::from_millis(0))? {
                return Ok(TurnOutcome::Aborted);
            }
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
        sim::{SimBody, SimParams},
        testing::{QuietLink, StopAfterLink},
    };

    const BIAS: f64 = 0.4;

    fn sim() -> SimBody {
        SimBody::new(SimParams {
            gyro_bias_dps: BIAS,
            ..Default::default()
        })
    }

    #[test]
    fn test_turn_settles() {
        let body = sim();
        let mut motor = body.motor();
        let mut gyro = body.gyro();
        gyro.init().unwrap();

        let params = VehicleParams::default();

        let report =
            turn(&mut motor, &mut gyro, &mut QuietLink, &params, 90.0, BIAS).unwrap();

        assert_eq!(report.outcome, TurnOutcome::Settled);
        assert!(report.error_deg.abs() < params.angle_tolerance_deg);
        assert!(report.elapsed < params.turn_timeout());

        let snap = body.snapshot();
        assert!((snap.heading_deg - 90.0).abs() < 2.0, "{}", snap.heading_deg);
        assert_eq!(snap.stop_calls, 1);

        // And back the other way
        let report =
            turn(&mut motor, &mut gyro, &mut QuietLink, &params, -90.0, BIAS).unwrap();
        assert_eq!(report.outcome, TurnOutcome::Settled);
        assert!(body.snapshot().heading_deg.abs() < 3.0);
        assert_eq!(body.snapshot().stop_calls, 2);
    }

    #[test]
    fn test_turn_timeout() {
        // A motor too weak to move the vehicle never reaches the target
        let body = SimBody::new(SimParams {
            spin_dps_per_duty: 0.0,
            gyro_bias_dps: 0.0,
            ..Default::default()
        });
        let mut motor = body.motor();
        let mut gyro = body.gyro();
        gyro.init().unwrap();

        let params = VehicleParams {
            turn_timeout_s: 0.3,
            ..Default::default()
        };

        let report = turn(&mut motor, &mut gyro, &mut QuietLink, &params, 90.0, 0.0).unwrap();

        assert_eq!(report.outcome, TurnOutcome::TimedOut);
        assert!(report.elapsed >= Duration::from_millis(300));
        assert_eq!(body.snapshot().stop_calls, 1);
    }

    #[test]
    fn test_turn_aborted() {
        let body = sim();
        let mut motor = body.motor();
        let mut gyro = body.gyro();
        gyro.init().unwrap();

        let params = VehicleParams::default();
        let mut link = StopAfterLink::new(2);

        let report = turn(&mut motor, &mut gyro, &mut link, &params, -90.0, BIAS).unwrap();

        assert_eq!(report.outcome, TurnOutcome::Aborted);
        assert!(report.angle_deg > -90.0);
        assert_eq!(body.snapshot().stop_calls, 1);
        assert_eq!(body.snapshot().action, MotorAction::Hold);
    }

    #[test]
    fn test_gyro_failure_still_stops() {
        let body = sim();
        let mut motor = body.motor();

        // Never initialised
        let mut gyro = body.gyro();

        let result = turn(
            &mut motor,
            &mut gyro,
            &mut QuietLink,
            &VehicleParams::default(),
            90.0,
            BIAS,
        );

        assert!(matches!(result, Err(VehicleError::Gyro(_))));
        assert_eq!(body.snapshot().stop_calls, 1);
    }
}
