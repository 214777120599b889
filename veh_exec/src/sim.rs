//! # Simulated hardware
//!
//! A [`SimBody`] models the vehicle as a point with a heading. The simulated motor, gyroscope and
//! LED all share one body, so that spinning the motor changes what the gyroscope reads.
//!
//! The body's state is advanced lazily from the wall clock whenever any of its parts is used.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::Deserialize;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use crate::hw::{check_speed, ActuationError, Gyro, GyroError, MotorAction, MotorDriver, StatusLed};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulated vehicle, loaded from `sim.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Yaw rate produced per percent of spin duty, in degrees per second.
    pub spin_dps_per_duty: f64,

    /// Forward speed produced per percent of forward duty, in cells per second.
    pub cells_per_s_per_duty: f64,

    /// Constant bias added to every gyroscope reading.
    pub gyro_bias_dps: f64,

    /// If set the gyroscope fails to initialise.
    pub gyro_init_fails: bool,
}

/// Shared state of a simulated vehicle.
#[derive(Clone)]
pub struct SimBody {
    params: SimParams,
    state: Arc<Mutex<SimState>>,
}

/// Read-only copy of the simulated state.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSnapshot {
    /// Heading relative to the start, anticlockwise positive.
    pub heading_deg: f64,

    /// Total forward distance driven.
    pub distance: f64,

    /// Action currently commanded.
    pub action: MotorAction,

    /// Number of calls made to [`MotorDriver::stop`].
    pub stop_calls: usize,

    /// Current LED duty.
    pub led_duty: f64,

    /// Number of times the LED duty has changed.
    pub led_changes: usize,

    /// Number of successful gyroscope initialisations.
    pub gyro_inits: usize,
}

pub struct SimMotor {
    body: SimBody,
}

pub struct SimGyro {
    body: SimBody,
    ready: bool,
}

pub struct SimLed {
    body: SimBody,
}

struct SimState {
    heading_deg: f64,
    distance: f64,
    action: MotorAction,
    speed: f64,
    last_update: Instant,
    stop_calls: usize,
    led_duty: f64,
    led_changes: usize,
    gyro_inits: usize,
    gyro_init_fails: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            spin_dps_per_duty: 1.0,
            cells_per_s_per_duty: 0.3,
            gyro_bias_dps: 0.4,
            gyro_init_fails: false,
        }
    }
}

impl SimBody {
    pub fn new(params: SimParams) -> Self {
        let state = SimState {
            heading_deg: 0.0,
            distance: 0.0,
            action: MotorAction::Hold,
            speed: 0.0,
            last_update: Instant::now(),
            stop_calls: 0,
            led_duty: 0.0,
            led_changes: 0,
            gyro_inits: 0,
            gyro_init_fails: params.gyro_init_fails,
        };

        Self {
            params,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor { body: self.clone() }
    }

    pub fn gyro(&self) -> SimGyro {
        SimGyro {
            body: self.clone(),
            ready: false,
        }
    }

    pub fn led(&self) -> SimLed {
        SimLed { body: self.clone() }
    }

    /// Make future gyroscope initialisations fail or succeed.
    pub fn set_gyro_init_fails(&self, fails: bool) {
        self.lock().gyro_init_fails = fails;
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let mut state = self.lock();
        self.advance(&mut state);

        SimSnapshot {
            heading_deg: state.heading_deg,
            distance: state.distance,
            action: state.action,
            stop_calls: state.stop_calls,
            led_duty: state.led_duty,
            led_changes: state.led_changes,
            gyro_inits: state.gyro_inits,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Integrate the motion since the last update.
    fn advance(&self, state: &mut SimState) {
        let now = Instant::now();
        let dt = (now - state.last_update).as_secs_f64();
        state.last_update = now;

        match state.action {
            MotorAction::Forward => {
                state.distance += state.speed * self.params.cells_per_s_per_duty * dt
            }
            MotorAction::SpinLeft => {
                state.heading_deg += state.speed * self.params.spin_dps_per_duty * dt
            }
            MotorAction::SpinRight => {
                state.heading_deg -= state.speed * self.params.spin_dps_per_duty * dt
            }
            MotorAction::Hold => (),
        }
    }

    fn yaw_rate(&self, state: &SimState) -> f64 {
        let rate = state.speed * self.params.spin_dps_per_duty;

        match state.action {
            MotorAction::SpinLeft => rate,
            MotorAction::SpinRight => -rate,
            _ => 0.0,
        }
    }
}

impl MotorDriver for SimMotor {
    fn drive(&mut self, action: MotorAction, speed: f64) -> Result<(), ActuationError> {
        let speed = check_speed(speed)?;
        let mut state = self.body.lock();
        self.body.advance(&mut state);

        state.action = action;
        state.speed = match action {
            MotorAction::Hold => 0.0,
            _ => speed,
        };

        trace!("SimMotor: {:?} at {:.1}%", action, state.speed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuationError> {
        let mut state = self.body.lock();
        self.body.advance(&mut state);

        state.action = MotorAction::Hold;
        state.speed = 0.0;
        state.stop_calls += 1;

        trace!("SimMotor: stop");
        Ok(())
    }
}

impl Gyro for SimGyro {
    fn init(&mut self) -> Result<(), GyroError> {
        let mut state = self.body.lock();

        if state.gyro_init_fails {
            self.ready = false;
            return Err(GyroError::Init("simulated sensor not responding".into()));
        }

        state.gyro_inits += 1;
        self.ready = true;
        Ok(())
    }

    fn rate_dps(&mut self) -> Result<f64, GyroError> {
        if !self.ready {
            return Err(GyroError::NotInitialised);
        }

        let mut state = self.body.lock();
        self.body.advance(&mut state);

        Ok(self.body.yaw_rate(&state) + self.body.params.gyro_bias_dps)
    }
}

impl StatusLed for SimLed {
    fn set_duty(&mut self, percent: f64) -> Result<(), ActuationError> {
        let percent = check_speed(percent)?;
        let mut state = self.body.lock();

        if (state.led_duty - percent).abs() > f64::EPSILON {
            state.led_changes += 1;
        }
        state.led_duty = percent;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn test_spin_reads_on_gyro() {
        let body = SimBody::new(SimParams {
            gyro_bias_dps: 0.5,
            ..Default::default()
        });
        let mut motor = body.motor();
        let mut gyro = body.gyro();

        assert!(matches!(gyro.rate_dps(), Err(GyroError::NotInitialised)));
        gyro.init().unwrap();
        assert_eq!(gyro.rate_dps().unwrap(), 0.5);

        motor.drive(MotorAction::SpinRight, 50.0).unwrap();
        assert_eq!(gyro.rate_dps().unwrap(), -50.0 + 0.5);

        thread::sleep(Duration::from_millis(50));
        motor.stop().unwrap();

        let snap = body.snapshot();
        assert!(snap.heading_deg < -2.0);
        assert_eq!(snap.stop_calls, 1);
        assert_eq!(snap.action, MotorAction::Hold);

        assert!(motor.drive(MotorAction::Forward, 120.0).is_err());
    }

    #[test]
    fn test_gyro_init_failure() {
        let body = SimBody::new(SimParams {
            gyro_init_fails: true,
            ..Default::default()
        });
        let mut gyro = body.gyro();

        assert!(matches!(gyro.init(), Err(GyroError::Init(_))));

        body.set_gyro_init_fails(false);
        gyro.init().unwrap();
        assert_eq!(body.snapshot().gyro_inits, 1);
    }
}
