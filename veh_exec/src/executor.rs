//! # Motion executor
//!
//! Runs a command sequence on the hardware. Forward moves are timed open loop, scaled by the
//! calibration profile of the image source. Turns are closed loop through the heading
//! controller and need a calibrated gyroscope.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    cmd::{Axis, Primitive},
    net::Link,
};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};
use util::time::secs_f64;

use crate::{
    heading_ctrl::{self, TurnOutcome},
    hw::{Gyro, MotorAction, MotorDriver},
    params::{CalibProfile, VehicleParams},
    vehicle::{poll_stop, VehicleError},
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Every primitive was run.
    Completed,

    /// A STOP ended the sequence early.
    Stopped,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Runs sequences against one set of hardware.
pub struct Executor<'a, M: ?Sized, G: ?Sized> {
    motor: &'a mut M,
    gyro: &'a mut G,
    params: &'a VehicleParams,
    profile: CalibProfile,

    /// Gyroscope bias, `None` if the gyroscope is not usable for turns.
    offset_dps: Option<f64>,

    /// Dead reckoned heading relative to the start of the sequence.
    heading_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a, M, G> Executor<'a, M, G>
where
    M: MotorDriver + ?Sized,
    G: Gyro + ?Sized,
{
    pub fn new(
        motor: &'a mut M,
        gyro: &'a mut G,
        params: &'a VehicleParams,
        profile: CalibProfile,
        offset_dps: Option<f64>,
    ) -> Self {
        Self {
            motor,
            gyro,
            params,
            profile,
            offset_dps,
            heading_deg: 0.0,
        }
    }

    /// The gyroscope bias, cleared if the gyroscope failed during a turn.
    pub fn offset_dps(&self) -> Option<f64> {
        self.offset_dps
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_deg
    }

    /// Time to drive forward for a move of `magnitude` steps along `axis`.
    pub fn forward_duration(&self, axis: Axis, magnitude: u32) -> Duration {
        secs_f64(self.params.step_duration_s * magnitude as f64 * self.profile.gain(axis))
    }

    /// Run a sequence, checking for STOP throughout and between primitives.
    pub fn run<L: Link + ?Sized>(
        &mut self,
        seq: &[Primitive],
        link: &mut L,
    ) -> Result<ExecOutcome, VehicleError> {
        info!("Executing {} primitives", seq.len());

        for (i, prim) in seq.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, seq.len(), prim);

            let outcome = match *prim {
                Primitive::Forward { axis, magnitude } => self.forward(axis, magnitude, link)?,
                Primitive::TurnLeft => self.turn(self.params.turn_angle_deg, link)?,
                Primitive::TurnRight => self.turn(-self.params.turn_angle_deg, link)?,
            };

            if outcome == ExecOutcome::Stopped {
                info!("Sequence stopped at primitive {}", i + 1);
                return Ok(ExecOutcome::Stopped);
            }

            debug!("Heading estimate: {:.1} deg", self.heading_deg);

            if i + 1 < seq.len() && poll_stop(link, self.params.inter_cmd_poll())? {
                info!("Sequence stopped after primitive {}", i + 1);
                return Ok(ExecOutcome::Stopped);
            }
        }

        info!(
            "Sequence complete, final heading estimate {:.1} deg",
            self.heading_deg
        );

        Ok(ExecOutcome::Completed)
    }

    fn forward<L: Link + ?Sized>(
        &mut self,
        axis: Axis,
        magnitude: u32,
        link: &mut L,
    ) -> Result<ExecOutcome, VehicleError> {
        let duration = self.forward_duration(axis, magnitude);
        debug!("Driving forward for {:.3} s", duration.as_secs_f64());

        let result = self.drive_for(duration, link);

        // Motors always stopped at the end of the move
        match (result, self.motor.stop()) {
            (Ok(o), Ok(())) => Ok(o),
            (Ok(_), Err(e)) => Err(VehicleError::Actuation(e)),
            (Err(e), _) => Err(e),
        }
    }

    fn drive_for<L: Link + ?Sized>(
        &mut self,
        duration: Duration,
        link: &mut L,
    ) -> Result<ExecOutcome, VehicleError> {
        let start = Instant::now();
        self.motor
            .drive(MotorAction::Forward, self.params.forward_speed)?;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return Ok(ExecOutcome::Completed);
            }

            let wait = (duration - elapsed).min(self.params.stop_poll());
            if poll_stop(link, wait)? {
                return Ok(ExecOutcome::Stopped);
            }
        }
    }

    fn turn<L: Link + ?Sized>(
        &mut self,
        target_deg: f64,
        link: &mut L,
    ) -> Result<ExecOutcome, VehicleError> {
        let offset = match self.offset_dps {
            Some(o) => o,
            None => {
                warn!("Gyroscope not calibrated, skipping turn");
                return Ok(ExecOutcome::Completed);
            }
        };

        match heading_ctrl::turn(
            &mut *self.motor,
            &mut *self.gyro,
            link,
            self.params,
            target_deg,
            offset,
        ) {
            Ok(report) => {
                self.heading_deg += report.angle_deg;
                match report.outcome {
                    TurnOutcome::Aborted => Ok(ExecOutcome::Stopped),
                    _ => Ok(ExecOutcome::Completed),
                }
            }
            Err(VehicleError::Gyro(e)) => {
                error!("Gyroscope failed during turn, turns disabled until recalibrated: {}", e);
                self.offset_dps = None;
                Ok(ExecOutcome::Completed)
            }
            Err(e) => Err(e),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
