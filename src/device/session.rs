//! Single-flight command session over a [`SocTransport`].
//!
//! ```text
//!            send_command            wait_for_completion
//!   Idle ───────────────▶ AwaitingResult ──────────────▶ ResultReady ─┐
//!    ▲                          │                                     │
//!    │                          └────────────────────▶ Rejected ──────┤
//!    │        read_result / discard_result (clears command)           │
//!    └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session owns the transport for its whole lifetime. Dropping it
//! clears any outstanding command and closes the transport.

use crate::config::SessionConfig;
use crate::core::codec;
use crate::core::windowing::WeightedMeanSource;
use crate::device::transport::SocTransport;
use crate::device::types::{DeviceCommand, DeviceInfo, DeviceMode, DeviceStatus};
use crate::device::{CancelToken, DeviceError};
use crate::telemetry::SharedRunStats;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Host-side view of the command cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResult(DeviceCommand),
    ResultReady(DeviceCommand),
    Rejected(DeviceCommand),
    Closed,
}

pub struct DeviceSession<T: SocTransport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    mode_verified: bool,
    cancel: CancelToken,
    stats: Option<SharedRunStats>,
}

impl<T: SocTransport> DeviceSession<T> {
    /// Take ownership of `transport` and bring the device to `WaitingForCommand`.
    ///
    /// A command left behind by an earlier, interrupted run is cleared first.
    pub fn connect(transport: T, config: SessionConfig) -> Result<Self, DeviceError> {
        let mut session = Self {
            transport,
            config,
            state: SessionState::Idle,
            mode_verified: false,
            cancel: CancelToken::new(),
            stats: None,
        };

        let status = session.transport.read_status()?;
        debug!(%status, "device status on connect");

        if status != DeviceStatus::WaitingForCommand {
            warn!(%status, "device busy on connect, clearing previous command");
            let timeout = session.config.connect_timeout;
            if status == DeviceStatus::Calculating {
                session.poll_until(timeout, DeviceStatus::is_terminal)?;
            }
            session.transport.write_command(DeviceCommand::NoCommand)?;
            session.poll_until(timeout, |s| s == DeviceStatus::WaitingForCommand)?;
        }

        Ok(session)
    }

    /// Use `token` to abort the status poll.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_stats(mut self, stats: SharedRunStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Fail with `Cancelled` once the cancel token is set.
    pub fn check_cancelled(&self) -> Result<(), DeviceError> {
        if self.cancel.is_cancelled() {
            Err(DeviceError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mosi_buffer_size(&self) -> usize {
        self.transport.mosi_buffer_size()
    }

    /// Confirm the device is in `expected` mode. Commands are refused until this succeeds.
    pub fn require_mode(&mut self, expected: &DeviceMode) -> Result<(), DeviceError> {
        self.ensure_open()?;
        let found = self.transport.configuration()?;
        if &found != expected {
            self.mode_verified = false;
            return Err(DeviceError::WrongDeviceMode {
                expected: expected.clone(),
                found,
            });
        }

        info!(mode = %found, "device mode verified");
        self.mode_verified = true;
        Ok(())
    }

    /// Read the current registers.
    pub fn info(&mut self) -> Result<DeviceInfo, DeviceError> {
        self.ensure_open()?;
        Ok(DeviceInfo {
            mode: self.transport.configuration()?,
            status: self.transport.read_status()?,
            mosi_buffer_size: self.transport.mosi_buffer_size(),
            miso_buffer_size: self.transport.miso_buffer_size(),
        })
    }

    /// Write `payload` to the MOSI buffer and issue `command`.
    pub fn send_command(
        &mut self,
        command: DeviceCommand,
        payload: &[u8],
    ) -> Result<(), DeviceError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Closed => return Err(DeviceError::Closed),
            _ => return Err(DeviceError::CommandInFlight),
        }
        if command == DeviceCommand::NoCommand {
            return Err(DeviceError::InvalidCommandRejected(command));
        }
        if !self.mode_verified {
            return Err(DeviceError::ModeNotVerified);
        }
        self.check_cancelled()?;

        let expected = self.transport.mosi_buffer_size();
        if payload.len() != expected {
            return Err(DeviceError::PayloadSize {
                expected,
                actual: payload.len(),
            });
        }

        let status = self.transport.read_status()?;
        if status != DeviceStatus::WaitingForCommand {
            return Err(DeviceError::NotReady(status));
        }

        self.transport.write_mosi_buffer(payload)?;
        self.transport.write_command(command)?;
        self.state = SessionState::AwaitingResult(command);
        if let Some(stats) = &self.stats {
            stats.record_command_sent();
        }
        debug!(%command, bytes = payload.len(), "command issued");
        Ok(())
    }

    /// Poll the status register until the in-flight command finishes.
    ///
    /// Returns `Done` or `InvalidCommand`; fails with `DeviceTimeout` once
    /// `poll_timeout` elapses and with `Cancelled` if the token is set.
    pub fn wait_for_completion(&mut self) -> Result<DeviceStatus, DeviceError> {
        let command = match self.state {
            SessionState::AwaitingResult(command) => command,
            SessionState::Closed => return Err(DeviceError::Closed),
            _ => return Err(DeviceError::NoResult),
        };

        let status = self.poll_until(self.config.poll_timeout, DeviceStatus::is_terminal)?;
        self.state = match status {
            DeviceStatus::Done => SessionState::ResultReady(command),
            _ => {
                if let Some(stats) = &self.stats {
                    stats.record_command_rejected();
                }
                SessionState::Rejected(command)
            }
        };
        Ok(status)
    }

    /// Read the result buffer and clear the command.
    pub fn read_result(&mut self) -> Result<Vec<u8>, DeviceError> {
        match self.state {
            SessionState::ResultReady(_) => {
                let buffer = self.transport.read_miso_buffer()?;
                self.release_command()?;
                if let Some(stats) = &self.stats {
                    stats.record_result_received();
                }
                Ok(buffer)
            }
            SessionState::Rejected(command) => {
                self.release_command()?;
                Err(DeviceError::InvalidCommandRejected(command))
            }
            SessionState::Closed => Err(DeviceError::Closed),
            _ => Err(DeviceError::NoResult),
        }
    }

    /// Drop a finished command's result without reading it.
    pub fn discard_result(&mut self) -> Result<(), DeviceError> {
        match self.state {
            SessionState::ResultReady(_) | SessionState::Rejected(_) => self.release_command(),
            SessionState::Closed => Err(DeviceError::Closed),
            _ => Err(DeviceError::NoResult),
        }
    }

    /// Run one full command cycle and return the result buffer.
    pub fn calculate(
        &mut self,
        command: DeviceCommand,
        payload: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        self.send_command(command, payload)?;
        self.wait_for_completion()?;
        self.read_result()
    }

    /// Clear any outstanding command and close the transport.
    pub fn close(mut self) -> Result<(), DeviceError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), DeviceError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let clear = if self.state != SessionState::Idle {
            debug!(state = ?self.state, "clearing outstanding command before close");
            self.transport.write_command(DeviceCommand::NoCommand)
        } else {
            Ok(())
        };
        self.state = SessionState::Closed;
        let closed = self.transport.close();
        clear.and(closed)
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.state == SessionState::Closed {
            Err(DeviceError::Closed)
        } else {
            Ok(())
        }
    }

    /// Clear the command register and wait for the firmware to go idle.
    fn release_command(&mut self) -> Result<(), DeviceError> {
        self.transport.write_command(DeviceCommand::NoCommand)?;
        self.state = SessionState::Idle;
        self.poll_until(self.config.poll_timeout, |s| {
            s == DeviceStatus::WaitingForCommand
        })?;
        Ok(())
    }

    fn poll_until(
        &mut self,
        timeout: Duration,
        done: impl Fn(DeviceStatus) -> bool,
    ) -> Result<DeviceStatus, DeviceError> {
        let start = Instant::now();
        let mut interval = self.config.poll_interval;
        let mut polls = 0u32;

        loop {
            self.check_cancelled()?;
            let status = self.transport.read_status()?;
            polls += 1;
            if done(status) {
                debug!(%status, polls, "poll finished");
                return Ok(status);
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(DeviceError::DeviceTimeout { waited, polls });
            }
            thread::sleep(interval.min(timeout - waited));
            interval = (interval * 2).min(self.config.max_poll_interval);
        }
    }
}

impl<T: SocTransport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("failed to release device cleanly: {e}");
        }
    }
}

impl<T: SocTransport> WeightedMeanSource for DeviceSession<T> {
    fn max_window(&self) -> usize {
        codec::max_values(self.transport.mosi_buffer_size())
    }

    fn weighted_mean(&mut self, window: &[f32]) -> Result<Option<f32>, DeviceError> {
        let payload = codec::pack(window, self.transport.mosi_buffer_size())?;
        let result = self.calculate(DeviceCommand::Weighted, &payload)?;
        let value = codec::unpack_result(&result, self.config.result_offset)?;

        if value.is_finite() {
            Ok(Some(value))
        } else {
            warn!(value, "device returned a non-finite weighted mean");
            Ok(None)
        }
    }
}
