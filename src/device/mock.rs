//! In-memory SoC used for simulated runs and tests.
//!
//! Follows the command/status handshake: idle until a command is written,
//! report `Calculating` for a configurable number of status polls, then
//! `Done` (or `InvalidCommand`), and return to idle once the host clears
//! the command register. The result is a plain ascending-weight mean
//! computed on the host; it does not reproduce the weighting of the
//! device firmware.

use crate::core::codec::{self, CodecError, FLOAT_SIZE, PREFIX_SIZE};
use crate::device::transport::SocTransport;
use crate::device::types::{DeviceCommand, DeviceMode, DeviceStatus};
use crate::device::DeviceError;

/// Weighted mean with ascending weights `1, 2, ..., n`.
///
/// This is the calculation the simulated device performs for a
/// `Weighted` command. Returns NaN for an empty window.
pub fn ascending_weighted_mean(values: &[f32]) -> f32 {
    let (weighted_sum, weight_total) = values
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(sum, total), (i, &v)| {
            let weight = (i + 1) as f64;
            (sum + weight * v as f64, total + weight)
        });
    (weighted_sum / weight_total) as f32
}

/// Simulated device.
#[derive(Debug, Clone)]
pub struct MockTransport {
    mode: DeviceMode,
    status: DeviceStatus,
    command: DeviceCommand,
    mosi: Vec<u8>,
    miso: Vec<u8>,
    calculation_polls: u32,
    remaining_polls: u32,
    hang: bool,
    reject_all: bool,
    nan_on_call: Option<usize>,
    calls: usize,
    mosi_writes: usize,
    command_writes: Vec<DeviceCommand>,
    status_reads: u32,
    configuration_reads: u32,
    closed: bool,
}

impl MockTransport {
    /// A device in SoC mode with 4 KiB buffers that finishes after two polls.
    pub fn new() -> Self {
        Self {
            mode: DeviceMode::Soc,
            status: DeviceStatus::WaitingForCommand,
            command: DeviceCommand::NoCommand,
            mosi: vec![0; 4096],
            miso: vec![0; 4096],
            calculation_polls: 2,
            remaining_polls: 0,
            hang: false,
            reject_all: false,
            nan_on_call: None,
            calls: 0,
            mosi_writes: 0,
            command_writes: Vec::new(),
            status_reads: 0,
            configuration_reads: 0,
            closed: false,
        }
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = DeviceMode::parse(mode);
        self
    }

    pub fn with_buffer_sizes(mut self, mosi: usize, miso: usize) -> Self {
        self.mosi = vec![0; mosi];
        self.miso = vec![0; miso];
        self
    }

    /// Number of `Calculating` reads reported before the result is ready.
    pub fn with_calculation_polls(mut self, polls: u32) -> Self {
        self.calculation_polls = polls;
        self
    }

    /// Status the device reports before the host touches it.
    pub fn with_initial_status(mut self, status: DeviceStatus) -> Self {
        self.status = status;
        if status.is_terminal() {
            self.command = DeviceCommand::Weighted;
        }
        self
    }

    /// Never leave `Calculating`.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Answer every command with `InvalidCommand`.
    pub fn rejecting(mut self) -> Self {
        self.reject_all = true;
        self
    }

    /// Return NaN for the `call`-th command (0-based).
    pub fn with_nan_result_on(mut self, call: usize) -> Self {
        self.nan_on_call = Some(call);
        self
    }

    pub fn mosi_writes(&self) -> usize {
        self.mosi_writes
    }

    pub fn command_writes(&self) -> &[DeviceCommand] {
        &self.command_writes
    }

    /// Number of commands that reached `Done`.
    pub fn commands_completed(&self) -> usize {
        self.calls
    }

    pub fn status_reads(&self) -> u32 {
        self.status_reads
    }

    pub fn configuration_reads(&self) -> u32 {
        self.configuration_reads
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.closed {
            Err(DeviceError::Closed)
        } else {
            Ok(())
        }
    }

    fn finish_calculation(&mut self) -> Result<(), DeviceError> {
        if self.reject_all || self.command != DeviceCommand::Weighted {
            self.status = DeviceStatus::InvalidCommand;
            return Ok(());
        }

        let prefix: [u8; PREFIX_SIZE] = self
            .mosi
            .get(..PREFIX_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(CodecError::BufferTooSmall {
                required: PREFIX_SIZE,
                available: self.mosi.len(),
            })?;
        let count = u32::from_le_bytes(prefix) as usize;
        let result = match codec::unpack(&self.mosi, PREFIX_SIZE, count) {
            Ok(values) if self.nan_on_call != Some(self.calls) => ascending_weighted_mean(&values),
            _ => f32::NAN,
        };

        let available = self.miso.len();
        self.miso.iter_mut().for_each(|b| *b = 0);
        self.miso
            .get_mut(..FLOAT_SIZE)
            .ok_or(CodecError::BufferTooSmall {
                required: FLOAT_SIZE,
                available,
            })?
            .copy_from_slice(&result.to_le_bytes());
        self.calls += 1;
        self.status = DeviceStatus::Done;
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SocTransport for MockTransport {
    fn read_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        self.ensure_open()?;
        self.status_reads += 1;

        if self.status == DeviceStatus::Calculating && !self.hang {
            if self.remaining_polls == 0 {
                self.finish_calculation()?;
            } else {
                self.remaining_polls -= 1;
            }
        }
        Ok(self.status)
    }

    fn configuration(&mut self) -> Result<DeviceMode, DeviceError> {
        self.ensure_open()?;
        self.configuration_reads += 1;
        Ok(self.mode.clone())
    }

    fn mosi_buffer_size(&self) -> usize {
        self.mosi.len()
    }

    fn miso_buffer_size(&self) -> usize {
        self.miso.len()
    }

    fn write_mosi_buffer(&mut self, buffer: &[u8]) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if buffer.len() != self.mosi.len() {
            return Err(DeviceError::PayloadSize {
                expected: self.mosi.len(),
                actual: buffer.len(),
            });
        }
        self.mosi.copy_from_slice(buffer);
        self.mosi_writes += 1;
        Ok(())
    }

    fn write_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.command_writes.push(command);
        self.command = command;

        match command {
            DeviceCommand::NoCommand => self.status = DeviceStatus::WaitingForCommand,
            _ if self.status == DeviceStatus::WaitingForCommand => {
                self.status = DeviceStatus::Calculating;
                self.remaining_polls = self.calculation_polls;
            }
            _ => {}
        }
        Ok(())
    }

    fn read_miso_buffer(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.ensure_open()?;
        Ok(self.miso.clone())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.closed = true;
        Ok(())
    }
}
