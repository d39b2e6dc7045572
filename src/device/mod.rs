//! Device access for the C0-microSD Signaloid SoC.
//!
//! The device is driven through a half-duplex register protocol: the host
//! writes a payload into the MOSI buffer, sets the command register, polls
//! the status register until the firmware reports completion, reads the MISO
//! buffer and finally clears the command register.
//!
//! - [`transport`] is the raw register boundary ([`SocTransport`]).
//! - [`session`] wraps a transport in an explicit state machine with mode
//!   gating and a bounded poll.
//! - [`mock`] is an in-memory device used for `--simulate` runs and tests.

pub mod mock;
pub mod session;
pub mod transport;
pub mod types;

use crate::core::codec::CodecError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// Re-export commonly used types
pub use mock::MockTransport;
pub use session::{DeviceSession, SessionState};
pub use transport::{DeviceLayout, FileTransport, SocTransport};
pub use types::{DeviceCommand, DeviceInfo, DeviceMode, DeviceStatus};

/// Errors raised while talking to the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device is in '{found}' mode, expected '{expected}'; switch to SoC mode and try again")]
    WrongDeviceMode { expected: DeviceMode, found: DeviceMode },

    #[error("device mode has not been verified; no command may be issued")]
    ModeNotVerified,

    #[error("device rejected command '{0}'")]
    InvalidCommandRejected(DeviceCommand),

    #[error("device did not complete within {waited:?} ({polls} status polls)")]
    DeviceTimeout { waited: Duration, polls: u32 },

    #[error("device not ready for a command (status: {0})")]
    NotReady(DeviceStatus),

    #[error("a command is already in flight")]
    CommandInFlight,

    #[error("no result available to read")]
    NoResult,

    #[error("payload is {actual} bytes but the MOSI buffer is {expected} bytes")]
    PayloadSize { expected: usize, actual: usize },

    #[error("device reported unknown status code {0}")]
    UnknownStatus(u32),

    #[error("operation cancelled")]
    Cancelled,

    #[error("device session is closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Cooperative cancellation flag checked at the device poll.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
