//! Core processing for the C0 window host.
//!
//! This module contains:
//! - The fixed-size float buffer codec shared with the device firmware
//! - The sliding window engine computing per-axis statistics
//! - The result assembler producing output records

pub mod assembler;
pub mod codec;
pub mod windowing;

// Re-export commonly used types
pub use assembler::{output_header, AuxiliaryLayout, OutputRecord, OutputRecords, ResultAssembler};
pub use codec::CodecError;
pub use windowing::{
    Axis, EngineError, SampleRecord, SlidingWindowEngine, WeightedMeanSource, WindowStatistics,
};
