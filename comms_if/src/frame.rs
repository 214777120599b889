//! # Protocol frames
//!
//! Every message exchanged during a control session is a single line of UTF-8 text. This module
//! converts between those lines and the [`Frame`] enum.
//!
//! | Frame                        | Direction          |
//! |------------------------------|--------------------|
//! | `CALIBRATE:<source>`         | planner -> vehicle |
//! | `COMMANDS:<payload>`         | planner -> vehicle |
//! | `ERROR:<reason>`             | planner -> vehicle |
//! | `SERVER_SHUTDOWN`            | planner -> vehicle |
//! | `BUSY`                       | planner -> vehicle |
//! | `CALIBRATION_DONE:<offset>`  | vehicle -> planner |
//! | `CALIBRATION_FAIL:<reason>`  | vehicle -> planner |
//! | `COMMANDS_RECEIVED_VALID`    | vehicle -> planner |
//! | `COMMANDS_INVALID_FORMAT`    | vehicle -> planner |
//! | `SEQUENCE_DONE`              | vehicle -> planner |
//! | `STOP_ACK`                   | vehicle -> planner |
//! | `STOP`                       | either             |

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::cmd::{self, CmdParseError, CommandSequence};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Reason sent with `CALIBRATION_FAIL` when the gyroscope could not be initialised.
pub const REASON_GYRO_INIT: &str = "MPU_INIT_ERROR";

/// Reason sent with `ERROR` when calibration finished but the planner holds no sequence.
pub const REASON_NO_COMMANDS: &str = "NO_COMMANDS_AVAILABLE";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Image acquisition source, which selects the vehicle's distance calibration profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibSource {
    Camera,
    Gallery,
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Calibrate(CalibSource),
    Commands(CommandSequence),
    Error(String),
    ServerShutdown,
    Busy,
    CalibrationDone(f64),
    CalibrationFail(String),
    CommandsReceivedValid,
    CommandsInvalidFormat,
    SequenceDone,
    StopAck,
    Stop,
}

/// Errors produced when a received line is not a valid frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameParseError {
    #[error("Unknown message: {0:?}")]
    Unknown(String),

    #[error("Invalid COMMANDS payload: {0}")]
    InvalidCommands(CmdParseError),

    #[error("Invalid calibration offset: {0:?}")]
    InvalidOffset(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CalibSource {
    /// The token used on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            CalibSource::Camera => "CAMERA",
            CalibSource::Gallery => "GALLERY",
        }
    }

    /// Parse a token, ignoring case. Returns `None` for unknown tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "CAMERA" => Some(CalibSource::Camera),
            "GALLERY" => Some(CalibSource::Gallery),
            _ => None,
        }
    }
}

impl Default for CalibSource {
    /// Unknown or missing sources fall back to the camera profile.
    fn default() -> Self {
        CalibSource::Camera
    }
}

impl FromStr for CalibSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CalibSource::from_token(s).ok_or_else(|| format!("unknown image source {:?}", s))
    }
}

impl fmt::Display for CalibSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl Frame {
    /// Parse a frame from a line, with any line terminator already removed.
    pub fn parse(line: &str) -> Result<Self, FrameParseError> {
        let line = line.trim();

        // Split off the payload, if there is one
        let (head, payload) = match line.find(':') {
            Some(i) => (&line[..i], Some(&line[i + 1..])),
            None => (line, None),
        };

        match (head, payload) {
            ("CALIBRATE", p) => {
                let token = p.unwrap_or("");
                let source = match CalibSource::from_token(token) {
                    Some(s) => s,
                    None => {
                        warn!(
                            "Unknown calibration source {:?}, using {}",
                            token,
                            CalibSource::default()
                        );
                        CalibSource::default()
                    }
                };
                Ok(Frame::Calibrate(source))
            }
            ("COMMANDS", Some(p)) => cmd::decode(p)
                .map(Frame::Commands)
                .map_err(FrameParseError::InvalidCommands),
            ("ERROR", Some(p)) => Ok(Frame::Error(p.to_string())),
            ("CALIBRATION_DONE", Some(p)) => p
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|o| o.is_finite())
                .map(Frame::CalibrationDone)
                .ok_or_else(|| FrameParseError::InvalidOffset(p.to_string())),
            ("CALIBRATION_FAIL", p) => Ok(Frame::CalibrationFail(p.unwrap_or("").to_string())),
            ("SERVER_SHUTDOWN", None) => Ok(Frame::ServerShutdown),
            ("BUSY", None) => Ok(Frame::Busy),
            ("COMMANDS_RECEIVED_VALID", None) => Ok(Frame::CommandsReceivedValid),
            ("COMMANDS_INVALID_FORMAT", None) => Ok(Frame::CommandsInvalidFormat),
            ("SEQUENCE_DONE", None) => Ok(Frame::SequenceDone),
            ("STOP_ACK", None) => Ok(Frame::StopAck),
            ("STOP", None) => Ok(Frame::Stop),
            _ => Err(FrameParseError::Unknown(line.to_string())),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Calibrate(s) => write!(f, "CALIBRATE:{}", s),
            Frame::Commands(seq) => write!(f, "COMMANDS:{}", cmd::encode(seq)),
            Frame::Error(r) => write!(f, "ERROR:{}", r),
            Frame::ServerShutdown => write!(f, "SERVER_SHUTDOWN"),
            Frame::Busy => write!(f, "BUSY"),
            Frame::CalibrationDone(o) => write!(f, "CALIBRATION_DONE:{}", o),
            Frame::CalibrationFail(r) => write!(f, "CALIBRATION_FAIL:{}", r),
            Frame::CommandsReceivedValid => write!(f, "COMMANDS_RECEIVED_VALID"),
            Frame::CommandsInvalidFormat => write!(f, "COMMANDS_INVALID_FORMAT"),
            Frame::SequenceDone => write!(f, "SEQUENCE_DONE"),
            Frame::StopAck => write!(f, "STOP_ACK"),
            Frame::Stop => write!(f, "STOP"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::cmd::{Axis, Primitive};

    #[test]
    fn test_calibrate() {
        assert_eq!(Frame::parse("CALIBRATE:CAMERA").unwrap(), Frame::Calibrate(CalibSource::Camera));
        assert_eq!(Frame::parse("CALIBRATE:gallery").unwrap(), Frame::Calibrate(CalibSource::Gallery));

        // Unknown and missing sources fall back to the default profile
        assert_eq!(Frame::parse("CALIBRATE:DRONE").unwrap(), Frame::Calibrate(CalibSource::Camera));
        assert_eq!(Frame::parse("CALIBRATE").unwrap(), Frame::Calibrate(CalibSource::Camera));

        assert_eq!(Frame::Calibrate(CalibSource::Gallery).to_string(), "CALIBRATE:GALLERY");
    }

    #[test]
    fn test_calibration_done() {
        assert_eq!(
            Frame::parse("CALIBRATION_DONE:-0.42").unwrap(),
            Frame::CalibrationDone(-0.42)
        );
        assert!(matches!(
            Frame::parse("CALIBRATION_DONE:abc"),
            Err(FrameParseError::InvalidOffset(_))
        ));
        assert!(matches!(
            Frame::parse("CALIBRATION_DONE:NaN"),
            Err(FrameParseError::InvalidOffset(_))
        ));

        let offset = 0.123456789;
        match Frame::parse(&Frame::CalibrationDone(offset).to_string()).unwrap() {
            Frame::CalibrationDone(o) => assert_eq!(o, offset),
            f => panic!("Unexpected frame {:?}", f),
        }
    }

    #[test]
    fn test_commands() {
        let seq = vec![Primitive::forward(Axis::A, 12), Primitive::TurnRight];
        let line = Frame::Commands(seq.clone()).to_string();

        assert_eq!(line, r#"COMMANDS:[["forward_a",12],["turn_right",0]]"#);
        assert_eq!(Frame::parse(&line).unwrap(), Frame::Commands(seq));

        assert!(matches!(
            Frame::parse(r#"COMMANDS:[["jump", 1]]"#),
            Err(FrameParseError::InvalidCommands(_))
        ));
        assert!(matches!(Frame::parse("COMMANDS"), Err(FrameParseError::Unknown(_))));
    }

    #[test]
    fn test_simple_frames() {
        for f in &[
            Frame::ServerShutdown,
            Frame::Busy,
            Frame::CommandsReceivedValid,
            Frame::CommandsInvalidFormat,
            Frame::SequenceDone,
            Frame::StopAck,
            Frame::Stop,
        ] {
            assert_eq!(&Frame::parse(&f.to_string()).unwrap(), f);
        }

        assert_eq!(Frame::parse("  STOP\r").unwrap(), Frame::Stop);
        assert_eq!(
            Frame::parse("CALIBRATION_FAIL:MPU_INIT_ERROR").unwrap(),
            Frame::CalibrationFail(REASON_GYRO_INIT.into())
        );
        assert_eq!(
            Frame::parse("ERROR:NO_COMMANDS_AVAILABLE").unwrap(),
            Frame::Error(REASON_NO_COMMANDS.into())
        );
        assert!(matches!(Frame::parse("HELLO"), Err(FrameParseError::Unknown(_))));
        assert!(matches!(Frame::parse("STOP:now"), Err(FrameParseError::Unknown(_))));
    }
}
