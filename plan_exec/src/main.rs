//! # Planner Executable
//!
//! Loads a traversability mask, then accepts operator commands from the terminal to plan routes
//! through it and to drive the vehicle along them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use comms_if::{frame::CalibSource, net::NetParams};
use log::{info, warn};
use rustyline::{error::ReadlineError, history::DefaultHistory, Editor};
use std::{fs, path::PathBuf};
use structopt::StructOpt;

// Internal
use plan_lib::{
    grid::{Cell, Grid},
    planner::{Planner, PlannerParams},
    server::{PlanServer, ServerEvent},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "maze $ ";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "plan_exec", about = "Maze route planner and vehicle control server")]
struct Args {
    /// Text file containing the traversability mask, one row per line.
    #[structopt(parse(from_os_str))]
    mask: PathBuf,

    /// Minimum log level, `info`, `debug` or `trace`.
    #[structopt(short, long, default_value = "debug")]
    log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command typed by the operator.
#[derive(Debug, StructOpt)]
#[structopt(name = "")]
enum ConsoleCmd {
    /// Plan a route between two cells and hold it for the next drive.
    #[structopt(name = "plan")]
    Plan {
        start_row: i64,
        start_col: i64,
        end_row: i64,
        end_col: i64,
    },

    /// Calibrate the vehicle and drive the held route.
    #[structopt(name = "drive")]
    Drive {
        /// Image source the mask came from, `camera` or `gallery`.
        #[structopt(default_value = "camera", parse(from_str = parse_source))]
        source: CalibSource,
    },

    /// Stop the vehicle.
    #[structopt(name = "stop")]
    Stop,

    /// Show the session status.
    #[structopt(name = "status")]
    Status,

    /// Exit the planner.
    #[structopt(name = "quit")]
    Quit,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("plan_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(args.log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Maze Planner Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Failed to load network parameters")?;
    let planner_params: PlannerParams =
        util::params::load("planner.toml").wrap_err("Failed to load planner parameters")?;

    info!("Parameters loaded");

    // ---- LOAD MASK ----

    let mask_text = fs::read_to_string(&args.mask)
        .wrap_err_with(|| format!("Failed to read the mask file {:?}", args.mask))?;
    let grid = Grid::from_text(&mask_text).wrap_err("Invalid traversability mask")?;

    info!(
        "Loaded {}x{} mask with {} drivable cells",
        grid.num_rows(),
        grid.num_cols(),
        grid.num_traversable()
    );

    let planner = Planner::new(planner_params);

    // ---- SERVER INITIALISATION ----

    let server = PlanServer::start(&net_params).wrap_err("Failed to start the plan server")?;

    // ---- CONSOLE ----

    let history_path = session.path("history.txt");
    let mut rl = Editor::<(), DefaultHistory>::new().wrap_err("Failed to initialise the console")?;

    info!("Initialisation complete, waiting for operator commands");

    loop {
        for event in server.drain_events() {
            print_event(&event);
        }

        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).wrap_err("Failed to read from the console"),
        };

        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str());

        let cmd = match ConsoleCmd::from_iter_safe(std::iter::once("").chain(line.split_whitespace()))
        {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        match cmd {
            ConsoleCmd::Plan {
                start_row,
                start_col,
                end_row,
                end_col,
            } => {
                let start = Cell::new(start_row, start_col);
                let end = Cell::new(end_row, end_col);

                let plan = match planner.plan(&grid, start, end) {
                    Ok(p) => p,
                    Err(e) => {
                        println!("Cannot plan a route: {}", e);
                        continue;
                    }
                };

                println!(
                    "Route of {} cells with {} turn points:",
                    plan.pixel_path_len,
                    plan.simplified.len()
                );
                for line in &plan.rendering {
                    println!("    {}", line);
                }
                if !plan.is_dispatchable() {
                    println!("The optimised route is empty, nothing can be sent to the vehicle");
                }

                let directions_path = session.path(&planner.params().directions_file);
                if let Err(e) = plan.save_rendering(&directions_path) {
                    warn!("Could not save directions to {:?}: {}", directions_path, e);
                }

                if let Err(e) = server.set_plan(plan.commands) {
                    println!("{}", e);
                }
            }
            ConsoleCmd::Drive { source } => match server.drive(source) {
                Ok(_) => println!("Calibrating with the {} profile", source),
                Err(e) => println!("Cannot drive: {}", e),
            },
            ConsoleCmd::Stop => {
                if let Err(e) = server.stop() {
                    println!("Cannot stop: {}", e);
                }
            }
            ConsoleCmd::Status => {
                let status = server.status();
                println!("State:      {}", status.state);
                println!(
                    "Vehicle:    {}",
                    status.peer.as_deref().unwrap_or("not connected")
                );
                match status.calib_offset {
                    Some(o) => println!("Offset:     {:.4} deg/s", o),
                    None => println!("Offset:     not calibrated"),
                }
                match status.num_commands {
                    Some(n) => println!("Commands:   {}", n),
                    None => println!("Commands:   no plan held"),
                }
                println!(
                    "Can drive:  {}",
                    match status.check_can_drive() {
                        Ok(_) => "yes".to_string(),
                        Err(e) => format!("no, {}", e),
                    }
                );
            }
            ConsoleCmd::Quit => break,
        }
    }

    if let Err(e) = rl.save_history(&history_path) {
        warn!("Could not save console history: {}", e);
    }

    info!("Shutting down");
    server.shutdown().wrap_err("Plan server stopped with an error")?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Unknown sources fall back to the default profile.
fn parse_source(s: &str) -> CalibSource {
    match CalibSource::from_token(s) {
        Some(src) => src,
        None => {
            println!("Unknown image source {:?}, using {}", s, CalibSource::default());
            CalibSource::default()
        }
    }
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::VehicleConnected(p) => println!("Vehicle connected from {}", p),
        ServerEvent::VehicleDisconnected(p) => {
            println!("Vehicle {} disconnected, plan again before driving", p)
        }
        ServerEvent::BusyRejected(p) => println!("Rejected a second vehicle from {}", p),
        ServerEvent::StateChanged(s) => println!("Session state: {}", s),
        ServerEvent::CalibrationDone(o) => println!("Calibration complete, offset {:.4}", o),
        ServerEvent::CalibrationFailed(r) => println!("Calibration failed: {}", r),
        ServerEvent::SequenceAccepted => println!("Vehicle accepted the route"),
        ServerEvent::SequenceRejected => println!("Vehicle rejected the route"),
        ServerEvent::SequenceDone => println!("Vehicle completed the route"),
        ServerEvent::Stopped => println!("Vehicle stopped"),
        ServerEvent::ProtocolError(e) => println!("Protocol error: {}", e),
        ServerEvent::OperatorRejected(e) => println!("Command rejected: {}", e),
    }
}
