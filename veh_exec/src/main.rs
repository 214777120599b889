//! # Vehicle Executable
//!
//! Runs the vehicle side of the control session on the simulated hardware backend, reconnecting
//! to the planner whenever the connection is lost.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use comms_if::net::NetParams;
use log::info;
use structopt::StructOpt;

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};
use veh_lib::{
    client::VehClient,
    params::VehicleParams,
    sim::{SimBody, SimParams},
    vehicle::Vehicle,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "veh_exec", about = "Maze vehicle control client")]
struct Args {
    /// Minimum log level, `info`, `debug` or `trace`.
    #[structopt(short, long, default_value = "debug")]
    log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("veh_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(args.log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Maze Vehicle Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Failed to load network parameters")?;
    let veh_params: VehicleParams =
        util::params::load("vehicle.toml").wrap_err("Failed to load vehicle parameters")?;
    let sim_params: SimParams =
        util::params::load("sim.toml").wrap_err("Failed to load simulation parameters")?;

    info!("Parameters loaded");

    // ---- INITIALISE HARDWARE ----

    let body = SimBody::new(sim_params);
    let vehicle = Vehicle::new(body.motor(), body.gyro(), body.led(), veh_params);

    info!("Simulated hardware initialised");

    // ---- MAIN LOOP ----

    let mut client = VehClient::new(vehicle, net_params);
    client.run();

    Ok(())
}
