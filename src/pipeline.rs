//! End-to-end weighted-mean run.
//!
//! Samples → [`SlidingWindowEngine`] (one device command per window and
//! axis) → [`ResultAssembler`] → [`RecordWriter`].

use crate::core::assembler::{AuxiliaryLayout, ResultAssembler};
use crate::core::windowing::{EngineError, SlidingWindowEngine};
use crate::device::{DeviceError, DeviceMode, DeviceSession, SocTransport};
use crate::io::{InputTable, OutputError, RecordWriter};
use crate::telemetry::RunStats;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl PipelineError {
    /// Whether the run stopped because cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Device(DeviceError::Cancelled)
                | PipelineError::Engine(EngineError::Device(DeviceError::Cancelled))
        )
    }
}

/// What a run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub windows: usize,
    pub records: usize,
    pub skipped_windows: usize,
}

/// Parameters for one weighted-mean run.
#[derive(Debug, Clone)]
pub struct WeightedRun {
    pub window_size: usize,
    pub layout: AuxiliaryLayout,
}

impl WeightedRun {
    pub fn new(window_size: usize, layout: AuxiliaryLayout) -> Self {
        Self {
            window_size,
            layout,
        }
    }

    /// Verify the device mode, compute all windows and write the records.
    ///
    /// Nothing is sent to the device unless it reports SoC mode.
    pub fn execute<T: SocTransport>(
        &self,
        session: &mut DeviceSession<T>,
        input: &InputTable,
        writer: &mut RecordWriter,
        stats: &RunStats,
    ) -> Result<RunOutcome, PipelineError> {
        session.require_mode(&DeviceMode::Soc)?;
        session.check_cancelled()?;
        stats.record_rows_skipped(input.skipped.len() as u64);

        let engine = SlidingWindowEngine::new(self.window_size)?;
        let windows = engine.compute(&input.records, session)?;
        stats.record_windows_computed(windows.len() as u64);

        let assembler = ResultAssembler::new(self.window_size, self.layout.clone());
        let mut records = assembler.assemble(&windows, &input.records);
        for record in records.by_ref() {
            session.check_cancelled()?;
            writer.write(&record)?;
            stats.record_record_written();
        }
        stats.record_windows_skipped(records.skipped() as u64);

        let outcome = RunOutcome {
            windows: windows.len(),
            records: writer.written(),
            skipped_windows: records.skipped(),
        };
        info!(
            windows = outcome.windows,
            records = outcome.records,
            skipped = outcome.skipped_windows,
            "weighted run complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::device::{CancelToken, MockTransport};
    use crate::io::read_samples;

    fn ramp_csv(rows: usize, columns: usize) -> String {
        (0..rows)
            .map(|i| {
                (0..columns)
                    .map(|c| if c < 3 { i.to_string() } else { format!("{}", i * 100 + c) })
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_run_with_auxiliary_columns() {
        let input = read_samples(ramp_csv(12, 9).as_bytes()).unwrap();
        let mut session =
            DeviceSession::connect(MockTransport::new(), SessionConfig::default()).unwrap();
        let mut writer = RecordWriter::in_memory(&AuxiliaryLayout::detect(9)).unwrap();
        let stats = RunStats::new();

        let run = WeightedRun::new(10, AuxiliaryLayout::detect(input.max_columns));
        let outcome = run.execute(&mut session, &input, &mut writer, &stats).unwrap();

        assert_eq!(outcome.windows, 2);
        assert_eq!(outcome.records, 2);
        assert_eq!(session.transport().commands_completed(), 6);

        let text = writer.finish_to_string().unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        // Midpoints are rows 5 and 6
        assert!(rows[1].starts_with("4.5,4.5,4.5,6,6,6,503,"));
        assert!(rows[2].ends_with(",603,604,605,606,607,608"));
    }

    #[test]
    fn test_wrong_mode_aborts_before_any_command() {
        let input = read_samples(ramp_csv(12, 3).as_bytes()).unwrap();
        let device = MockTransport::new().with_mode("bootloader");
        let mut session = DeviceSession::connect(device, SessionConfig::default()).unwrap();
        let mut writer = RecordWriter::in_memory(&AuxiliaryLayout::none()).unwrap();

        let err = WeightedRun::new(10, AuxiliaryLayout::none())
            .execute(&mut session, &input, &mut writer, &RunStats::new())
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Device(DeviceError::WrongDeviceMode { .. })
        ));
        assert_eq!(session.transport().mosi_writes(), 0);
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn test_cancelled_run_writes_nothing() {
        let input = read_samples(ramp_csv(50, 3).as_bytes()).unwrap();
        let token = CancelToken::new();
        let device = MockTransport::new().with_calculation_polls(0);
        let mut session = DeviceSession::connect(device, SessionConfig::default())
            .unwrap()
            .with_cancel_token(token.clone());
        let mut writer = RecordWriter::in_memory(&AuxiliaryLayout::none()).unwrap();
        token.cancel();

        let err = WeightedRun::new(10, AuxiliaryLayout::none())
            .execute(&mut session, &input, &mut writer, &RunStats::new())
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(session.transport().mosi_writes(), 0);
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn test_mode_read_once_per_run() {
        let input = read_samples(ramp_csv(12, 3).as_bytes()).unwrap();
        let mut session =
            DeviceSession::connect(MockTransport::new(), SessionConfig::default()).unwrap();
        let mut writer = RecordWriter::in_memory(&AuxiliaryLayout::none()).unwrap();

        WeightedRun::new(10, AuxiliaryLayout::none())
            .execute(&mut session, &input, &mut writer, &RunStats::new())
            .unwrap();
        assert_eq!(session.transport().configuration_reads(), 1);
    }

    #[test]
    fn test_rejected_command_aborts_run() {
        let input = read_samples(ramp_csv(12, 3).as_bytes()).unwrap();
        let device = MockTransport::new().rejecting();
        let mut session = DeviceSession::connect(device, SessionConfig::default()).unwrap();
        let mut writer = RecordWriter::in_memory(&AuxiliaryLayout::none()).unwrap();

        let err = WeightedRun::new(10, AuxiliaryLayout::none())
            .execute(&mut session, &input, &mut writer, &RunStats::new())
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Engine(EngineError::Device(DeviceError::InvalidCommandRejected(_)))
        ));
        assert!(!err.is_cancelled());
        assert_eq!(writer.written(), 0);
    }
}
