//! Run telemetry for the C0 window host.

pub mod stats;

// Re-export commonly used types
pub use stats::{create_shared_stats, RunSnapshot, RunStats, SharedRunStats};
