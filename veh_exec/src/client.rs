//! # Vehicle client
//!
//! Keeps the vehicle connected to the planner. Each connection runs one session, after which the
//! client waits out the reconnect backoff and tries again.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::{LineStream, NetParams};
use log::{error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    hw::{Gyro, MotorDriver, StatusLed},
    vehicle::{SessionEnd, Vehicle, VehicleError},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Granularity of the backoff sleep, so that a shutdown request is noticed promptly.
const BACKOFF_TICK: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct VehClient<M, G, S> {
    vehicle: Vehicle<M, G, S>,
    params: NetParams,
    shutdown: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<M, G, S> VehClient<M, G, S>
where
    M: MotorDriver,
    G: Gyro,
    S: StatusLed,
{
    pub fn new(vehicle: Vehicle<M, G, S>, params: NetParams) -> Self {
        Self {
            vehicle,
            params,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag which, once set, makes [`VehClient::run`] return after the current session.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Connect, run sessions and reconnect until shut down.
    ///
    /// Only actuation failures are worth reporting above a warning, every other failure is
    /// expected while the planner is not running.
    pub fn run(&mut self) {
        info!("Vehicle client started, planner at {}", self.params.server_addr);

        while !self.is_shutdown() {
            match self.run_once() {
                Ok(SessionEnd::Busy) => warn!("Planner busy, retrying later"),
                Ok(end) => info!("Disconnected from planner ({:?})", end),
                Err(VehicleError::Link(e)) => warn!("Could not reach the planner: {}", e),
                Err(e) => error!("Session failed: {}", e),
            }

            self.backoff();
        }

        info!("Vehicle client stopped");
    }

    /// Connect once and run a single session.
    pub fn run_once(&mut self) -> Result<SessionEnd, VehicleError> {
        let mut link =
            LineStream::connect(&self.params.server_addr, self.params.connect_timeout())?;
        info!("Connected to planner at {}", link.peer());

        let end = self.vehicle.run_session(&mut link);
        link.shutdown();

        end
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn backoff(&self) {
        let start = Instant::now();
        let backoff = self.params.reconnect_backoff();

        while !self.is_shutdown() && start.elapsed() < backoff {
            thread::sleep(backoff.saturating_sub(start.elapsed()).min(BACKOFF_TICK));
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
        params::VehicleParams,
        sim::{SimBody, SimGyro, SimLed, SimMotor, SimParams},
    };
    use std::net::TcpListener;

    type SimClient = VehClient<SimMotor, SimGyro, SimLed>;

    fn client(addr: String, backoff_s: f64) -> (SimBody, SimClient) {
        let body = SimBody::new(SimParams::default());
        let vehicle = Vehicle::new(
            body.motor(),
            body.gyro(),
            body.led(),
            VehicleParams::default(),
        );
        let params = NetParams {
            server_addr: addr,
            connect_timeout_ms: 200,
            reconnect_backoff_s: backoff_s,
            ..Default::default()
        };

        (body, VehClient::new(vehicle, params))
    }

    #[test]
    fn test_no_planner() {
        // Bind then drop to find a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .to_string();

        let (_body, mut client) = client(addr, 0.1);
        assert!(matches!(client.run_once(), Err(VehicleError::Link(_))));
    }

    #[test]
    fn test_shutdown_ends_run() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .to_string();

        let (_body, mut client) = client(addr, 60.0);
        let shutdown = client.shutdown_handle();

        let handle = thread::spawn(move || client.run());

        thread::sleep(Duration::from_millis(300));
        shutdown.store(true, Ordering::Relaxed);

        // Returns well within the backoff
        let start = Instant::now();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
