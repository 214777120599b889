//! General time utility functions

use chrono;
use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        None
    }
}

/// Build a std duration from a number of milliseconds read from a parameter file.
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Build a std duration from a (possibly negative or NaN) number of seconds.
///
/// Non-positive and non-finite values produce a zero duration.
pub fn secs_f64(s: f64) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_secs_f64(s)
    }
    else {
        Duration::from_secs(0)
    }
}
