//! C0 Window Host - offloads windowed weighted means to a C0-microSD SoC.
//!
//! IMU samples are read from a delimited table, split into sliding windows,
//! and each window of each primary axis is sent to the device, which returns
//! its weighted mean. The host computes the plain moving average locally and
//! writes one output row per window.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        C0 Window Host                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Input     │──▶│  Sliding    │──▶│  Result     │──▶ CSV  │
//! │  │  (CSV rows) │   │  Window     │   │  Assembler  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                       │       ▲                              │
//! │                 pack  ▼       │ unpack                       │
//! │                    ┌─────────────┐    ┌─────────────┐        │
//! │                    │   Device    │───▶│  Transport  │──▶ SoC │
//! │                    │   Session   │    │ (registers) │        │
//! │                    └─────────────┘    └─────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use c0_window_host::{
//!     config::SessionConfig,
//!     core::AuxiliaryLayout,
//!     device::{DeviceSession, MockTransport},
//!     io::{read_samples_from_path, RecordWriter},
//!     pipeline::WeightedRun,
//!     telemetry::RunStats,
//! };
//!
//! let input = read_samples_from_path("imu.csv").expect("Failed to read input");
//! let mut session = DeviceSession::connect(MockTransport::new(), SessionConfig::default())
//!     .expect("Failed to connect");
//! let mut writer = RecordWriter::to_stdout(&AuxiliaryLayout::none()).expect("stdout");
//!
//! WeightedRun::new(10, AuxiliaryLayout::none())
//!     .execute(&mut session, &input, &mut writer, &RunStats::new())
//!     .expect("Run failed");
//! writer.finish().expect("Failed to flush output");
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod io;
pub mod pipeline;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use config::{Config, SessionConfig};
pub use core::{
    AuxiliaryLayout, OutputRecord, ResultAssembler, SampleRecord, SlidingWindowEngine,
    WindowStatistics,
};
pub use device::{CancelToken, DeviceError, DeviceSession, FileTransport, MockTransport};
pub use pipeline::{PipelineError, RunOutcome, WeightedRun};
pub use telemetry::{RunStats, SharedRunStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
