//! # Hardware interfaces
//!
//! The vehicle's motors, gyroscope and status LED are reached through the traits in this module.
//! GPIO and I2C drivers for the real vehicle implement them outside this crate, the simulated
//! backend in [`crate::sim`] implements them for testing and bench runs.

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What the drive motors should do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MotorAction {
    /// Drive all wheels forwards.
    Forward,

    /// Spin on the spot anticlockwise, seen from above.
    SpinLeft,

    /// Spin on the spot clockwise, seen from above.
    SpinRight,

    /// Zero duty without releasing the drive, used between control ticks.
    Hold,
}

#[derive(Debug, thiserror::Error)]
pub enum ActuationError {
    #[error("Motor driver error: {0}")]
    Motor(String),

    #[error("Status LED error: {0}")]
    Led(String),

    #[error("Invalid speed demand {0}, must be within [0, 100]")]
    InvalidSpeed(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum GyroError {
    #[error("Could not initialise the gyroscope: {0}")]
    Init(String),

    #[error("Could not read the gyroscope: {0}")]
    Read(String),

    #[error("The gyroscope has not been initialised")]
    NotInitialised,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The drive motors.
pub trait MotorDriver {
    /// Command an action at a speed given as a percentage duty cycle.
    fn drive(&mut self, action: MotorAction, speed: f64) -> Result<(), ActuationError>;

    /// Stop all motors and release the drive.
    fn stop(&mut self) -> Result<(), ActuationError>;
}

/// A single axis rate gyroscope measuring the vehicle's yaw.
pub trait Gyro {
    /// Initialise the sensor, may be called again after a failure.
    fn init(&mut self) -> Result<(), GyroError>;

    /// Yaw rate in degrees per second, anticlockwise positive.
    fn rate_dps(&mut self) -> Result<f64, GyroError>;
}

/// The status LED.
pub trait StatusLed {
    /// Set the brightness as a percentage duty cycle.
    fn set_duty(&mut self, percent: f64) -> Result<(), ActuationError>;
}

/// Check a speed demand is a valid duty cycle.
pub fn check_speed(speed: f64) -> Result<f64, ActuationError> {
    if speed.is_finite() && (0.0..=100.0).contains(&speed) {
        Ok(speed)
    } else {
        Err(ActuationError::InvalidSpeed(speed))
    }
}
