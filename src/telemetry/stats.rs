//! Per-run counters.
//!
//! Counts device traffic and skipped data over a single run so the CLI can
//! report what happened. Nothing is persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Counters for the current run.
#[derive(Debug)]
pub struct RunStats {
    run_id: Uuid,
    commands_sent: AtomicU64,
    results_received: AtomicU64,
    commands_rejected: AtomicU64,
    windows_computed: AtomicU64,
    records_written: AtomicU64,
    rows_skipped: AtomicU64,
    windows_skipped: AtomicU64,
    run_start: DateTime<Utc>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            commands_sent: AtomicU64::new(0),
            results_received: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            windows_computed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            windows_skipped: AtomicU64::new(0),
            run_start: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result_received(&self) {
        self.results_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_windows_computed(&self, count: u64) {
        self.windows_computed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_record_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record input rows dropped by the parser.
    pub fn record_rows_skipped(&self, count: u64) {
        self.rows_skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record windows dropped by the assembler.
    pub fn record_windows_skipped(&self, count: u64) {
        self.windows_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id,
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            results_received: self.results_received.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            windows_computed: self.windows_computed.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            windows_skipped: self.windows_skipped.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_ms: (Utc::now() - self.run_start).num_milliseconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Run Statistics ({}):\n\
             - Commands sent: {}\n\
             - Results received: {}\n\
             - Commands rejected: {}\n\
             - Windows computed: {}\n\
             - Records written: {}\n\
             - Input rows skipped: {}\n\
             - Windows skipped: {}\n\
             - Duration: {} ms",
            stats.run_id,
            stats.commands_sent,
            stats.results_received,
            stats.commands_rejected,
            stats.windows_computed,
            stats.records_written,
            stats.rows_skipped,
            stats.windows_skipped,
            stats.run_duration_ms
        )
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub commands_sent: u64,
    pub results_received: u64,
    pub commands_rejected: u64,
    pub windows_computed: u64,
    pub records_written: u64,
    pub rows_skipped: u64,
    pub windows_skipped: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_ms: u64,
}

/// Run counters shared between the session, engine and writer.
pub type SharedRunStats = Arc<RunStats>;

pub fn create_shared_stats() -> SharedRunStats {
    Arc::new(RunStats::new())
}
