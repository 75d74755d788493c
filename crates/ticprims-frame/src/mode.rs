//! Protocol variants and the mode selection used to pick one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ticprims_transport::{HISTORIC_BAUD_RATE, STANDARD_BAUD_RATE};

use crate::delimiters::{HISTORIC_MARKER, HT, MARKER_LEN, SP, STANDARD_MARKER};
use crate::error::FrameError;

/// The TIC protocol variant a frame was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Legacy meters: 1200 baud, space separator.
    Historic,
    /// Linky standard mode: 9600 baud, tab separator, optional datetime field.
    Standard,
}

impl Mode {
    /// Field separator used inside groups.
    pub fn separator(self) -> u8 {
        match self {
            Mode::Historic => SP,
            Mode::Standard => HT,
        }
    }

    /// Line speed the meter transmits at.
    pub fn baud_rate(self) -> u32 {
        match self {
            Mode::Historic => HISTORIC_BAUD_RATE,
            Mode::Standard => STANDARD_BAUD_RATE,
        }
    }

    /// First bytes of a frame in this mode.
    pub fn marker(self) -> &'static [u8; MARKER_LEN] {
        match self {
            Mode::Historic => &HISTORIC_MARKER,
            Mode::Standard => &STANDARD_MARKER,
        }
    }

    /// The other variant.
    pub fn other(self) -> Mode {
        match self {
            Mode::Historic => Mode::Standard,
            Mode::Standard => Mode::Historic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Historic => "historic",
            Mode::Standard => "standard",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which mode a reader should use: a fixed one, or auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSelection {
    Historic,
    Standard,
    #[default]
    Auto,
}

impl ModeSelection {
    /// The fixed mode, or `None` for [`ModeSelection::Auto`].
    pub fn fixed(self) -> Option<Mode> {
        match self {
            ModeSelection::Historic => Some(Mode::Historic),
            ModeSelection::Standard => Some(Mode::Standard),
            ModeSelection::Auto => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModeSelection::Historic => "historic",
            ModeSelection::Standard => "standard",
            ModeSelection::Auto => "auto",
        }
    }
}

impl From<Mode> for ModeSelection {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Historic => ModeSelection::Historic,
            Mode::Standard => ModeSelection::Standard,
        }
    }
}

impl fmt::Display for ModeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeSelection {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "historic" | "historique" => Ok(ModeSelection::Historic),
            "standard" => Ok(ModeSelection::Standard),
            "auto" => Ok(ModeSelection::Auto),
            other => Err(FrameError::InvalidArgument(format!(
                "unknown mode {other:?} (expected historic, standard or auto)"
            ))),
        }
    }
}
