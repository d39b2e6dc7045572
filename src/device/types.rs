//! Register-level types shared by the device transport and session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands understood by the SoC firmware.
///
/// `NoCommand` is only ever written to clear the command register once a
/// calculation has been consumed; it is never dispatched as work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCommand {
    NoCommand = 0,
    Weighted = 1,
}

impl DeviceCommand {
    /// Register encoding.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Parse a sub-command name as used on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "weighted" => Some(DeviceCommand::Weighted),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::NoCommand => write!(f, "no-command"),
            DeviceCommand::Weighted => write!(f, "weighted"),
        }
    }
}

/// Status register values reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    WaitingForCommand = 0,
    Calculating = 1,
    Done = 2,
    InvalidCommand = 3,
}

impl DeviceStatus {
    /// Whether the firmware has finished with the current command.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeviceStatus::Done | DeviceStatus::InvalidCommand)
    }
}

impl TryFrom<u32> for DeviceStatus {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(DeviceStatus::WaitingForCommand),
            1 => Ok(DeviceStatus::Calculating),
            2 => Ok(DeviceStatus::Done),
            3 => Ok(DeviceStatus::InvalidCommand),
            other => Err(other),
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceStatus::WaitingForCommand => "waiting for command",
            DeviceStatus::Calculating => "calculating",
            DeviceStatus::Done => "done",
            DeviceStatus::InvalidCommand => "invalid command",
        };
        f.write_str(label)
    }
}

/// Operating mode advertised in the device configuration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMode {
    /// Command-driven calculation mode
    Soc,
    /// Firmware update mode
    Bootloader,
    Other(String),
}

impl DeviceMode {
    /// Parse the (possibly NUL-padded) configuration string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_matches(char::from(0)).trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "soc" => DeviceMode::Soc,
            "bootloader" => DeviceMode::Bootloader,
            _ => DeviceMode::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceMode::Soc => "soc",
            DeviceMode::Bootloader => "bootloader",
            DeviceMode::Other(s) => s,
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the device registers, as shown by `c0-window <dev> status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub mode: DeviceMode,
    pub status: DeviceStatus,
    pub mosi_buffer_size: usize,
    pub miso_buffer_size: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "C0-microSD")?;
        writeln!(f, "  Configuration: {}", self.mode)?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  MOSI buffer: {} bytes", self.mosi_buffer_size)?;
        write!(f, "  MISO buffer: {} bytes", self.miso_buffer_size)
    }
}
