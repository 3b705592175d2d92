//! # CANopen daemon commands
//!
//! The daemon's command socket accepts one text line per request:
//!
//! ```text
//! [<bus>] <node> read <index> <subindex> <type>
//! [<bus>] <node> write <index> <subindex> <type> <value>
//! [<bus>] <node> start
//! [<bus>] <node> preop
//! ```
//!
//! and answers with one line whose first token echoes the bus tag and whose second token is
//! either `OK`, a read value, or an `ERROR:` token. Commands are built as typed [`Command`]s and
//! only turned into text by [`Command::to_wire`] at the link boundary.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Token returned by the daemon for a successful write or NMT command.
pub const OK_TOKEN: &str = "OK";

/// Prefix of the token returned by the daemon when a command fails.
pub const ERROR_TOKEN_PREFIX: &str = "ERROR";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Address of an entry in a node's object dictionary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjAddr {
    pub index: u16,
    pub subindex: u8,
}

/// A typed command for the daemon, addressed to one node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// CANopen node id of the target device.
    pub node: u8,

    pub verb: Verb,
}

/// A response line from the daemon.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Response {
    raw: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Data types understood by the daemon for SDO reads and writes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    I8,
    I16,
    I32,
    U32,
}

/// The action requested by a [`Command`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// SDO upload of an object dictionary entry.
    Read { addr: ObjAddr, data_type: DataType },

    /// SDO download of a value into an object dictionary entry.
    Write {
        addr: ObjAddr,
        data_type: DataType,
        value: i64,
    },

    /// NMT start, puts the node into operational state.
    Start,

    /// NMT enter pre-operational, disables motion on drives.
    Preop,
}

/// Ways in which a response from the daemon can fail to carry what was asked for.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty or truncated response: {0:?}")]
    Malformed(String),

    #[error("Daemon reported an error: {0:?}")]
    Device(String),

    #[error("Expected a numeric value, found {0:?}")]
    NotNumeric(String),

    #[error("Value {0} is out of range for the requested type")]
    OutOfRange(i64),

    #[error("Expected {expected:?}, found {found:?}")]
    Unexpected { expected: String, found: String },
}

/// Errors parsing a command typed in the daemon's line format.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("Expected a {0}")]
    Missing(&'static str),

    #[error("Invalid {what}: {found:?}")]
    Invalid { what: &'static str, found: String },

    #[error("Unknown verb {0:?}, expected read, write, start or preop")]
    UnknownVerb(String),

    #[error("Unexpected trailing input {0:?}")]
    Trailing(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ObjAddr {
    /// Controlword, drives the CiA 402 state machine and starts moves.
    pub const CONTROL_WORD: ObjAddr = ObjAddr::new(0x6040, 0);

    /// Modes of operation, `1` is profile position mode.
    pub const MODES_OF_OPERATION: ObjAddr = ObjAddr::new(0x6060, 0);

    /// Position actual internal value.
    pub const POSITION_ACTUAL: ObjAddr = ObjAddr::new(0x6063, 0);

    /// Target position of a profile position move.
    pub const TARGET_POSITION: ObjAddr = ObjAddr::new(0x607A, 0);

    pub const PROFILE_VELOCITY: ObjAddr = ObjAddr::new(0x6081, 0);

    pub const PROFILE_ACCELERATION: ObjAddr = ObjAddr::new(0x6083, 0);

    pub const PROFILE_DECELERATION: ObjAddr = ObjAddr::new(0x6084, 0);

    pub const fn new(index: u16, subindex: u8) -> Self {
        Self { index, subindex }
    }
}

impl fmt::Display for ObjAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} {}", self.index, self.subindex)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::I8 => "i8",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::U32 => "u32",
        };
        f.write_str(s)
    }
}

impl Command {
    pub fn read(node: u8, addr: ObjAddr, data_type: DataType) -> Self {
        Self {
            node,
            verb: Verb::Read { addr, data_type },
        }
    }

    pub fn write(node: u8, addr: ObjAddr, data_type: DataType, value: i64) -> Self {
        Self {
            node,
            verb: Verb::Write {
                addr,
                data_type,
                value,
            },
        }
    }

    pub fn start(node: u8) -> Self {
        Self {
            node,
            verb: Verb::Start,
        }
    }

    pub fn preop(node: u8) -> Self {
        Self {
            node,
            verb: Verb::Preop,
        }
    }

    /// Serialise the command into the daemon's line format for the given bus.
    ///
    /// The returned string does not include the line terminator.
    pub fn to_wire(&self, bus: u8) -> String {
        format!("[{}] {}", bus, self)
    }
}

/// Formats the command without its bus tag, as used in logs.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verb {
            Verb::Read { addr, data_type } => {
                write!(f, "{} read {} {}", self.node, addr, data_type)
            }
            Verb::Write {
                addr,
                data_type,
                value,
            } => write!(f, "{} write {} {} {}", self.node, addr, data_type, value),
            Verb::Start => write!(f, "{} start", self.node),
            Verb::Preop => write!(f, "{} preop", self.node),
        }
    }
}

impl FromStr for DataType {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "i8" => Ok(DataType::I8),
            "i16" => Ok(DataType::I16),
            "i32" => Ok(DataType::I32),
            "u32" => Ok(DataType::U32),
            _ => Err(ParseCommandError::Invalid {
                what: "data type",
                found: s.into(),
            }),
        }
    }
}

/// Parses a command without its bus tag, e.g. `2 read 0x6063 0 i32`.
impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();

        let node = parse_int(tokens.next(), "node id")?;

        let cmd = match tokens.next() {
            Some("read") => {
                let addr = parse_addr(&mut tokens)?;
                let data_type = tokens
                    .next()
                    .ok_or(ParseCommandError::Missing("data type"))?
                    .parse()?;
                Command::read(node, addr, data_type)
            }
            Some("write") => {
                let addr = parse_addr(&mut tokens)?;
                let data_type = tokens
                    .next()
                    .ok_or(ParseCommandError::Missing("data type"))?
                    .parse()?;
                let value = parse_int(tokens.next(), "value")?;
                Command::write(node, addr, data_type, value)
            }
            Some("start") => Command::start(node),
            Some("preop") => Command::preop(node),
            Some(v) => return Err(ParseCommandError::UnknownVerb(v.into())),
            None => return Err(ParseCommandError::Missing("verb")),
        };

        match tokens.next() {
            Some(t) => Err(ParseCommandError::Trailing(t.into())),
            None => Ok(cmd),
        }
    }
}

impl Response {
    /// Wrap a raw response line. Line terminators are stripped.
    pub fn parse(line: &str) -> Self {
        Self {
            raw: line.trim_end_matches(|c| c == '\r' || c == '\n' || c == '\0').to_string(),
        }
    }

    /// The response as received, without its line terminator.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The second whitespace delimited token, which carries the result of the command.
    pub fn token(&self) -> Result<&str, ProtocolError> {
        self.raw
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| ProtocolError::Malformed(self.raw.clone()))
    }

    /// Check that the daemon acknowledged a write or NMT command.
    pub fn check_ok(&self) -> Result<(), ProtocolError> {
        let token = self.checked_token()?;

        if token == OK_TOKEN {
            Ok(())
        } else {
            Err(ProtocolError::Unexpected {
                expected: OK_TOKEN.into(),
                found: token.into(),
            })
        }
    }

    /// Parse the value returned by a read.
    ///
    /// Values are accepted in decimal (optionally negative) or as `0x` prefixed hexadecimal, which
    /// the daemon uses for unsigned types.
    pub fn value(&self) -> Result<i64, ProtocolError> {
        let token = self.checked_token()?;

        let parsed = match token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => token.parse::<i64>(),
        };

        parsed.map_err(|_| ProtocolError::NotNumeric(token.into()))
    }

    /// Get the result token, turning daemon error tokens into [`ProtocolError::Device`].
    fn checked_token(&self) -> Result<&str, ProtocolError> {
        let token = self.token()?;

        if token.starts_with(ERROR_TOKEN_PREFIX) {
            Err(ProtocolError::Device(self.raw.clone()))
        } else {
            Ok(token)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse an integer token in decimal or `0x` prefixed hexadecimal.
fn parse_int<T>(token: Option<&str>, what: &'static str) -> Result<T, ParseCommandError>
where
    T: std::convert::TryFrom<i64>,
{
    let token = token.ok_or(ParseCommandError::Missing(what))?;
    let invalid = || ParseCommandError::Invalid {
        what,
        found: token.into(),
    };

    let value = match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => token.parse::<i64>().map_err(|_| invalid())?,
    };

    T::try_from(value).map_err(|_| invalid())
}

fn parse_addr<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Result<ObjAddr, ParseCommandError> {
    let index = parse_int(tokens.next(), "index")?;
    let subindex = parse_int(tokens.next(), "subindex")?;
    Ok(ObjAddr::new(index, subindex))
}
