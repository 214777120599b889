//! # PID controller

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use util::maths::clamp_sym;

use crate::params::VehicleParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A PID controller with a clamped integral and a clamped output.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// Limit on the magnitude of the integral accumulation
    integral_limit: f64,

    /// Limit on the magnitude of the output
    output_limit: f64,

    /// Previous error, zero before the first update
    prev_error: f64,

    /// The integral accumulation
    integral: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains and limits.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, integral_limit: f64, output_limit: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral_limit: integral_limit.abs(),
            output_limit: output_limit.abs(),
            prev_error: 0.0,
            integral: 0.0,
        }
    }

    /// Create the heading controller from the vehicle parameters.
    pub fn from_params(params: &VehicleParams) -> Self {
        Self::new(
            params.k_p,
            params.k_i,
            params.k_d,
            params.integral_limit,
            params.max_output,
        )
    }

    /// Clear the integral and previous error.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Get the value of the controller for the given error, `dt` seconds after the last update.
    ///
    /// If `dt` is not positive the integral and derivative terms are not updated, only the
    /// proportional term and the existing integral contribute.
    pub fn update(&mut self, error: f64, dt: f64) -> f64 {
        let mut deriv = 0.0;

        if dt > 0.0 {
            self.integral = clamp_sym(self.integral + error * dt, self.integral_limit);
            deriv = (error - self.prev_error) / dt;
        }

        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        self.prev_error = error;

        clamp_sym(out, self.output_limit)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
