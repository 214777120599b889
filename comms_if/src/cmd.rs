//! # Motion primitives
//!
//! A planned route is handed to the vehicle as an ordered list of [`Primitive`]s. Forward
//! primitives carry a magnitude in mask pixels along with the image axis they were measured on,
//! since the vehicle's distance gain differs per axis. Turns are always 90 degrees.
//!
//! On the wire a sequence is a JSON array of `[tag, integer]` pairs, for example
//! `[["forward_b",40],["turn_left",0],["forward_a",25]]`.
//!
//! Older planners tag the same four primitives `ileri_a`, `ileri_b`, `sola_don` and `saga_don`.
//! These are accepted when decoding but never produced.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Wire tag of a forward primitive along axis A (image columns).
pub const TAG_FORWARD_A: &str = "forward_a";

/// Wire tag of a forward primitive along axis B (image rows).
pub const TAG_FORWARD_B: &str = "forward_b";

/// Wire tag of a left turn.
pub const TAG_TURN_LEFT: &str = "turn_left";

/// Wire tag of a right turn.
pub const TAG_TURN_RIGHT: &str = "turn_right";

/// Tags accepted in place of the ones above, in the same order.
pub const ALIAS_TAGS: [(&str, &str); 4] = [
    ("ileri_a", TAG_FORWARD_A),
    ("ileri_b", TAG_FORWARD_B),
    ("sola_don", TAG_TURN_LEFT),
    ("saga_don", TAG_TURN_RIGHT),
];

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// An ordered list of primitives, executed strictly in order by the vehicle.
pub type CommandSequence = Vec<Primitive>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The image axis a forward run was measured along.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Along the column axis (horizontal in the image)
    A,

    /// Along the row axis (vertical in the image)
    B,
}

/// One atomic motion instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    /// Drive straight ahead for `magnitude` pixels measured along `axis`.
    Forward { axis: Axis, magnitude: u32 },

    /// Rotate 90 degrees anticlockwise on the spot.
    TurnLeft,

    /// Rotate 90 degrees clockwise on the spot.
    TurnRight,
}

/// Reasons a COMMANDS payload is rejected.
#[derive(Debug, thiserror::Error)]
pub enum CmdParseError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Payload is not a list of commands")]
    NotAList,

    #[error("Command {0} is not an [action, value] pair")]
    NotAPair(usize),

    #[error("Command {0} has an unknown action: {1}")]
    UnknownAction(usize, String),

    #[error("Command {0} does not have a non-negative integer value")]
    InvalidValue(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Axis {
    /// Human readable name of the axis as seen in the source image.
    pub fn label(&self) -> &'static str {
        match self {
            Axis::A => "horizontal",
            Axis::B => "vertical",
        }
    }
}

impl Primitive {
    /// Shorthand for a forward primitive.
    pub fn forward(axis: Axis, magnitude: u32) -> Self {
        Primitive::Forward { axis, magnitude }
    }

    /// True if this primitive is a turn.
    pub fn is_turn(&self) -> bool {
        matches!(self, Primitive::TurnLeft | Primitive::TurnRight)
    }

    /// The wire tag of this primitive.
    pub fn tag(&self) -> &'static str {
        match self {
            Primitive::Forward { axis: Axis::A, .. } => TAG_FORWARD_A,
            Primitive::Forward { axis: Axis::B, .. } => TAG_FORWARD_B,
            Primitive::TurnLeft => TAG_TURN_LEFT,
            Primitive::TurnRight => TAG_TURN_RIGHT,
        }
    }

    /// The integer carried alongside the tag on the wire. Turns carry zero.
    pub fn value(&self) -> u32 {
        match self {
            Primitive::Forward { magnitude, .. } => *magnitude,
            _ => 0,
        }
    }

    /// Build a primitive from its wire tag (or an alias of it) and value, or `None` for an
    /// unknown tag.
    pub fn from_tag(tag: &str, value: u32) -> Option<Self> {
        let tag = ALIAS_TAGS
            .iter()
            .find(|(alias, _)| *alias == tag)
            .map_or(tag, |(_, canonical)| *canonical);

        match tag {
            TAG_FORWARD_A => Some(Primitive::forward(Axis::A, value)),
            TAG_FORWARD_B => Some(Primitive::forward(Axis::B, value)),
            TAG_TURN_LEFT => Some(Primitive::TurnLeft),
            TAG_TURN_RIGHT => Some(Primitive::TurnRight),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Forward { axis, magnitude } => {
                write!(f, "forward ({}) {}", axis.label(), magnitude)
            }
            Primitive::TurnLeft => write!(f, "turn left"),
            Primitive::TurnRight => write!(f, "turn right"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Encode a sequence into the COMMANDS payload.
pub fn encode(seq: &[Primitive]) -> String {
    let pairs: Vec<Value> = seq
        .iter()
        .map(|p| Value::Array(vec![Value::from(p.tag()), Value::from(p.value())]))
        .collect();

    Value::Array(pairs).to_string()
}

/// Decode a COMMANDS payload.
///
/// The whole payload is validated before anything is returned, so a bad entry anywhere in the list
/// rejects the entire sequence.
pub fn decode(payload: &str) -> Result<CommandSequence, CmdParseError> {
    let val: Value = serde_json::from_str(payload).map_err(CmdParseError::InvalidJson)?;

    let list = match val {
        Value::Array(l) => l,
        _ => return Err(CmdParseError::NotAList),
    };

    let mut seq = Vec::with_capacity(list.len());

    for (i, item) in list.iter().enumerate() {
        let pair = match item.as_array() {
            Some(p) if p.len() == 2 => p,
            _ => return Err(CmdParseError::NotAPair(i)),
        };

        let tag = match pair[0].as_str() {
            Some(t) => t,
            None => return Err(CmdParseError::UnknownAction(i, pair[0].to_string())),
        };

        let value = match pair[1].as_u64() {
            Some(v) if v <= u32::MAX as u64 => v as u32,
            _ => return Err(CmdParseError::InvalidValue(i)),
        };

        match Primitive::from_tag(tag, value) {
            Some(p) => seq.push(p),
            None => return Err(CmdParseError::UnknownAction(i, tag.to_string())),
        }
    }

    Ok(seq)
}

/// Project a sequence into its human readable rendering, one line per primitive.
pub fn render(seq: &[Primitive]) -> Vec<String> {
    seq.iter().map(|p| p.to_string()).collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encode() {
        let seq = vec![
            Primitive::forward(Axis::B, 40),
            Primitive::TurnLeft,
            Primitive::forward(Axis::A, 25),
            Primitive::TurnRight,
        ];

        assert_eq!(
            encode(&seq),
            r#"[["forward_b",40],["turn_left",0],["forward_a",25],["turn_right",0]]"#
        );
        assert_eq!(decode(&encode(&seq)).unwrap(), seq);
        assert_eq!(encode(&[]), "[]");
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        assert!(matches!(decode("not json"), Err(CmdParseError::InvalidJson(_))));
        assert!(matches!(decode(r#"{"forward_a": 3}"#), Err(CmdParseError::NotAList)));
        assert!(matches!(decode(r#"[["forward_a"]]"#), Err(CmdParseError::NotAPair(0))));
        assert!(matches!(
            decode(r#"[["forward_a", 3], ["reverse", 2]]"#),
            Err(CmdParseError::UnknownAction(1, _))
        ));
        assert!(matches!(decode(r#"[[3, 3]]"#), Err(CmdParseError::UnknownAction(0, _))));
        assert!(matches!(decode(r#"[["forward_a", -3]]"#), Err(CmdParseError::InvalidValue(0))));
        assert!(matches!(decode(r#"[["forward_a", 2.5]]"#), Err(CmdParseError::InvalidValue(0))));
        assert!(matches!(decode(r#"[["turn_left", "0"]]"#), Err(CmdParseError::InvalidValue(0))));
    }

    #[test]
    fn test_decode_alias_tags() {
        let seq = decode(r#"[["ileri_b", 40], ["sola_don", 0], ["ileri_a", 25], ["saga_don", 0]]"#)
            .unwrap();

        assert_eq!(
            seq,
            vec![
                Primitive::forward(Axis::B, 40),
                Primitive::TurnLeft,
                Primitive::forward(Axis::A, 25),
                Primitive::TurnRight,
            ]
        );

        // Always re-encoded with the canonical tags
        assert_eq!(
            encode(&seq),
            r#"[["forward_b",40],["turn_left",0],["forward_a",25],["turn_right",0]]"#
        );
    }

    #[test]
    fn test_decode_turn_value_ignored() {
        assert_eq!(decode(r#"[["turn_left", 7]]"#).unwrap(), vec![Primitive::TurnLeft]);
    }

    #[test]
    fn test_render() {
        let seq = vec![
            Primitive::forward(Axis::A, 25),
            Primitive::TurnRight,
            Primitive::forward(Axis::B, 40),
            Primitive::TurnLeft,
        ];

        assert_eq!(
            render(&seq),
            vec![
                "forward (horizontal) 25",
                "turn right",
                "forward (vertical) 40",
                "turn left"
            ]
        );
    }
}
