//! # Vehicle parameters
//!
//! Loaded from `vehicle.toml`. Every field has a default so a partial file, or no file at all in
//! tests, still gives a working vehicle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{cmd::Axis, frame::CalibSource};
use serde::Deserialize;
use std::time::Duration;
use util::time::{millis, secs_f64};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Distance scaling gains for one image source.
#[derive(Debug, Copy, Clone, Deserialize, PartialEq)]
pub struct CalibProfile {
    /// Gain applied to horizontal (axis A) forward moves.
    pub gain_a: f64,

    /// Gain applied to vertical (axis B) forward moves.
    pub gain_b: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    // ---- HEADING CONTROLLER ----
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Limit on the magnitude of the integral accumulator, in degree-seconds.
    pub integral_limit: f64,

    /// Limit on the magnitude of the controller output, in percent duty.
    pub max_output: f64,

    /// Lowest duty at which the motors reliably turn the vehicle. Smaller demands outside the
    /// deadband are raised to this.
    pub min_effective_output: f64,

    /// Controller outputs smaller than this command the motors to hold.
    pub output_deadband: f64,

    /// Heading error within which a turn is considered on target.
    pub angle_tolerance_deg: f64,

    /// Number of consecutive on target ticks needed to end a turn.
    pub settle_ticks: u32,

    /// Wall clock limit on a single turn.
    pub turn_timeout_s: f64,

    /// Magnitude of a single turn.
    pub turn_angle_deg: f64,

    /// Control loop period.
    pub control_period_ms: u64,

    // ---- MOTION EXECUTOR ----
    /// Duty used for forward moves.
    pub forward_speed: f64,

    /// Drive duration per scaled step.
    pub step_duration_s: f64,

    /// Interval at which long running actions check for a STOP.
    pub stop_poll_ms: u64,

    /// Pause between primitives, during which a STOP is also checked for.
    pub inter_cmd_poll_ms: u64,

    // ---- CALIBRATION ----
    /// Length of the gyroscope bias measurement.
    pub calib_duration_s: f64,

    /// Interval between gyroscope bias samples.
    pub calib_sample_ms: u64,

    /// Gains used for images from the live camera.
    pub camera: CalibProfile,

    /// Gains used for images loaded from the gallery.
    pub gallery: CalibProfile,

    // ---- STATUS LED ----
    /// LED duty while connected to the planner.
    pub connected_led_duty: f64,

    /// Length of the celebration after a completed sequence.
    pub celebrate_duration_s: f64,

    /// Time between LED toggles during the celebration.
    pub celebrate_interval_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CalibProfile {
    pub fn gain(&self, axis: Axis) -> f64 {
        match axis {
            Axis::A => self.gain_a,
            Axis::B => self.gain_b,
        }
    }
}

impl VehicleParams {
    /// The calibration profile for an image source.
    pub fn profile(&self, source: CalibSource) -> CalibProfile {
        match source {
            CalibSource::Camera => self.camera,
            CalibSource::Gallery => self.gallery,
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        secs_f64(self.turn_timeout_s)
    }

    pub fn control_period(&self) -> Duration {
        millis(self.control_period_ms)
    }

    pub fn stop_poll(&self) -> Duration {
        millis(self.stop_poll_ms)
    }

    pub fn inter_cmd_poll(&self) -> Duration {
        millis(self.inter_cmd_poll_ms)
    }

    pub fn calib_duration(&self) -> Duration {
        secs_f64(self.calib_duration_s)
    }

    pub fn calib_sample(&self) -> Duration {
        millis(self.calib_sample_ms)
    }

    pub fn celebrate_duration(&self) -> Duration {
        secs_f64(self.celebrate_duration_s)
    }

    pub fn celebrate_interval(&self) -> Duration {
        secs_f64(self.celebrate_interval_s)
    }
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            k_p: 2.8,
            k_i: 0.45,
            k_d: 0.3,
            integral_limit: 70.0,
            max_output: 85.0,
            min_effective_output: 35.0,
            output_deadband: 8.0,
            angle_tolerance_deg: 0.7,
            settle_ticks: 5,
            turn_timeout_s: 7.0,
            turn_angle_deg: 90.0,
            control_period_ms: 10,
            forward_speed: 35.0,
            step_duration_s: 0.1,
            stop_poll_ms: 50,
            inter_cmd_poll_ms: 200,
            calib_duration_s: 2.0,
            calib_sample_ms: 10,
            camera: CalibProfile {
                gain_a: 0.068,
                gain_b: 0.08,
            },
            gallery: CalibProfile {
                gain_a: 0.2,
                gain_b: 0.25,
            },
            connected_led_duty: 50.0,
            celebrate_duration_s: 10.0,
            celebrate_interval_s: 0.2,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file() {
        let params: VehicleParams = util::params::from_str(
            r#"
            k_p = 3.0
            turn_timeout_s = 5.0

            [gallery]
            gain_a = 0.5
            gain_b = 0.6
            "#,
        )
        .unwrap();

        assert_eq!(params.k_p, 3.0);
        assert_eq!(params.k_i, 0.45);
        assert_eq!(params.turn_timeout(), Duration::from_secs(5));
        assert_eq!(params.profile(CalibSource::Gallery).gain(Axis::B), 0.6);
        assert_eq!(params.profile(CalibSource::Camera).gain(Axis::A), 0.068);
    }
}
