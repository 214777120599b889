//! # Gyroscope calibration
//!
//! Measures the gyroscope's bias while the vehicle is stationary. The bias is subtracted from
//! every reading during turns.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{frame::REASON_GYRO_INIT, net::Link};
use log::{debug, info};
use std::{
    thread,
    time::{Duration, Instant},
};

use crate::{
    hw::{Gyro, GyroError},
    params::VehicleParams,
    vehicle::{poll_stop, VehicleError},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Reason given to the planner when the gyroscope could not be read during calibration.
pub const REASON_GYRO_READ: &str = "GYRO_READ_ERROR";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CalibOutcome {
    /// The measured bias in degrees per second.
    Done(f64),

    /// A STOP arrived before the measurement finished.
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    #[error("Gyroscope initialisation failed: {0}")]
    Init(GyroError),

    #[error("Gyroscope read failed during calibration: {0}")]
    Read(GyroError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CalibError {
    /// The reason token sent to the planner in a `CALIBRATION_FAIL` frame.
    pub fn reason(&self) -> &'static str {
        match self {
            CalibError::Init(_) => REASON_GYRO_INIT,
            CalibError::Read(_) => REASON_GYRO_READ,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Initialise the gyroscope.
pub fn init_gyro<G: Gyro + ?Sized>(gyro: &mut G) -> Result<(), CalibError> {
    gyro.init().map_err(CalibError::Init)?;
    info!("Gyroscope initialised");
    Ok(())
}

/// Average the gyroscope rate over the calibration period.
///
/// The vehicle must be stationary. STOP is checked for throughout, if one arrives no offset is
/// produced.
pub fn measure_offset<G, L>(
    gyro: &mut G,
    link: &mut L,
    params: &VehicleParams,
) -> Result<CalibOutcome, VehicleError>
where
    G: Gyro + ?Sized,
    L: Link + ?Sized,
{
    let start = Instant::now();
    let duration = params.calib_duration();
    let mut last_poll = start;

    let mut sum = 0.0;
    let mut num_samples: u32 = 0;

    info!("Measuring gyroscope offset over {:.1} s", duration.as_secs_f64());

    loop {
        let rate = gyro
            .rate_dps()
            .map_err(|e| VehicleError::Calib(CalibError::Read(e)))?;
        sum += rate;
        num_samples += 1;

        let now = Instant::now();
        if now - start >= duration {
            break;
        }

        if now - last_poll >= params.stop_poll() {
            last_poll = now;
            if poll_stop(link, Duration::from_millis(0))? {
                info!("Calibration stopped after {} samples", num_samples);
                return Ok(CalibOutcome::Stopped);
            }
        }

        thread::sleep(params.calib_sample());
    }

    let offset = sum / num_samples as f64;
    debug!("{} samples, offset {:.4} dps", num_samples, offset);
    info!("Gyroscope offset: {:.3} dps", offset);

    Ok(CalibOutcome::Done(offset))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
