//! Logger initialisation shared by the executables

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{self, info};
use fern;
use colored::{ColoredString, Colorize};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Targets which log on every control tick or keystroke, with the most verbose level each is
/// allowed to reach.
const QUIET_TARGETS: &[(&str, LevelFilter)] = &[
    ("veh_lib::heading_ctrl", LevelFilter::Debug),
    ("veh_lib::sim", LevelFilter::Debug),
    ("rustyline", LevelFilter::Warn),
];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level less than `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
/// 
/// Records are written both to stdout and to the session's log file.
/// 
/// # Notes
/// 
/// - `min_level` must be at least as verbose as `log::Level::Info`.
/// - This function must only be called once per process.
pub fn logger_init(
    min_level: self::LevelFilter, 
    session: &session::Session
) -> Result<(), LoggerInitError> {

    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    let mut dispatch = fern::Dispatch::new();
    for (target, cap) in QUIET_TARGETS {
        dispatch = dispatch.level_for(*target, capped_level(min_level, *cap));
    }

    dispatch
        .format(|out, message, record| {
            // Targets only matter when digging through debug output
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            }
            else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(min_level)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;
    
    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// The level to use for a quiet target, never more verbose than its cap.
fn capped_level(min_level: LevelFilter, cap: LevelFilter) -> LevelFilter {
    min_level.min(cap)
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_capped_level() {
        assert_eq!(capped_level(LevelFilter::Trace, LevelFilter::Debug), LevelFilter::Debug);
        assert_eq!(capped_level(LevelFilter::Info, LevelFilter::Debug), LevelFilter::Info);
        assert_eq!(capped_level(LevelFilter::Debug, LevelFilter::Warn), LevelFilter::Warn);

        // Per tick tracing stays out of trace runs
        for (target, cap) in QUIET_TARGETS {
            assert!(capped_level(LevelFilter::Trace, *cap) < LevelFilter::Trace, "{}", target);
        }
    }
}
