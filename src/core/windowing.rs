//! Sliding-window statistics over the primary sensor axes.
//!
//! Windows are `window_size` samples long and advance by one sample. For
//! each primary axis the engine computes a local arithmetic mean per window
//! and asks a [`WeightedMeanSource`] (the device) for the weighted mean of
//! the same window. Results are truncated so every window carries all six
//! values.

use crate::core::codec::{self, CodecError};
use crate::device::DeviceError;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of primary axes.
pub const PRIMARY_AXES: usize = 3;

/// A primary sensor axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; PRIMARY_AXES] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One parsed input row.
///
/// The primary axes are numeric; auxiliary channels are kept as raw text and
/// only parsed when a window's midpoint selects this row.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    primary: [f32; PRIMARY_AXES],
    auxiliary: Vec<String>,
}

impl SampleRecord {
    pub fn new(primary: [f32; PRIMARY_AXES], auxiliary: Vec<String>) -> Self {
        Self { primary, auxiliary }
    }

    pub fn primary(&self, axis: Axis) -> f32 {
        self.primary[axis.index()]
    }

    pub fn auxiliary(&self) -> &[String] {
        &self.auxiliary
    }

    /// Total number of columns in the source row.
    pub fn width(&self) -> usize {
        PRIMARY_AXES + self.auxiliary.len()
    }
}

/// Both statistics for one window index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    /// Window index, equal to the window's first sample offset
    pub index: usize,
    pub average: [f32; PRIMARY_AXES],
    pub weighted: [f32; PRIMARY_AXES],
}

impl WindowStatistics {
    pub fn start(&self) -> usize {
        self.index
    }

    /// Sample index at the centre of the window.
    pub fn mid_index(&self, window_size: usize) -> usize {
        self.index + window_size / 2
    }
}

/// Something that can compute the weighted mean of a window.
pub trait WeightedMeanSource {
    /// Longest window the source accepts.
    fn max_window(&self) -> usize;

    /// Weighted mean of `window` with ascending weights `1..=len`.
    ///
    /// `Ok(None)` means the response was dropped; the caller truncates there.
    fn weighted_mean(&mut self, window: &[f32]) -> Result<Option<f32>, DeviceError>;
}

/// Sliding window errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("window size must be at least 1")]
    InvalidWindowSize,

    #[error("window does not fit the device buffer: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Extract one axis as a contiguous series.
pub fn axis_series(records: &[SampleRecord], axis: Axis) -> Vec<f32> {
    records.iter().map(|r| r.primary(axis)).collect()
}

/// Number of full windows of `window_size` in a series of `len` samples.
pub fn window_count(len: usize, window_size: usize) -> usize {
    if window_size == 0 {
        return 0;
    }
    len.saturating_sub(window_size - 1)
}

/// Number of windows offloaded to the device.
///
/// The device loop stops one window short of [`window_count`].
pub fn weighted_window_count(len: usize, window_size: usize) -> usize {
    if window_size == 0 {
        return 0;
    }
    len.saturating_sub(window_size)
}

/// Arithmetic mean of every window.
pub fn local_averages(series: &[f32], window_size: usize) -> Vec<f32> {
    if window_size == 0 {
        return Vec::new();
    }
    series
        .windows(window_size)
        .map(|window| window.iter().map(|&v| v as f64).mean() as f32)
        .collect()
}

/// Device-computed weighted mean of up to `limit` windows.
///
/// Stops early at the first dropped response.
pub fn weighted_means<S: WeightedMeanSource + ?Sized>(
    series: &[f32],
    window_size: usize,
    source: &mut S,
    limit: usize,
) -> Result<Vec<f32>, DeviceError> {
    let count = weighted_window_count(series.len(), window_size).min(limit);
    let mut means = Vec::with_capacity(count);

    for start in 0..count {
        match source.weighted_mean(&series[start..start + window_size])? {
            Some(mean) => means.push(mean),
            None => {
                warn!(start, "dropped device response, truncating windows");
                break;
            }
        }
    }
    Ok(means)
}

/// Computes [`WindowStatistics`] for a sample series.
pub struct SlidingWindowEngine {
    window_size: usize,
}

impl SlidingWindowEngine {
    pub fn new(window_size: usize) -> Result<Self, EngineError> {
        if window_size == 0 {
            return Err(EngineError::InvalidWindowSize);
        }
        Ok(Self { window_size })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Compute aligned statistics for all primary axes.
    ///
    /// Fewer samples than one window yield an empty result.
    pub fn compute<S: WeightedMeanSource + ?Sized>(
        &self,
        records: &[SampleRecord],
        source: &mut S,
    ) -> Result<Vec<WindowStatistics>, EngineError> {
        let w = self.window_size;
        if records.len() < w {
            info!(
                samples = records.len(),
                window_size = w,
                "insufficient samples for a single window"
            );
            return Ok(Vec::new());
        }

        let max_window = source.max_window();
        if w > max_window {
            return Err(CodecError::BufferOverflow {
                required: codec::encoded_len(w),
                capacity: codec::encoded_len(max_window),
            }
            .into());
        }

        let mut averages: [Vec<f32>; PRIMARY_AXES] = Default::default();
        let mut weighted: [Vec<f32>; PRIMARY_AXES] = Default::default();
        let mut limit = usize::MAX;

        for axis in Axis::ALL {
            let series = axis_series(records, axis);
            let i = axis.index();

            averages[i] = local_averages(&series, w);
            weighted[i] = weighted_means(&series, w, &mut *source, limit)?;
            limit = limit.min(averages[i].len()).min(weighted[i].len());
            debug!(
                ?axis,
                averages = averages[i].len(),
                weighted = weighted[i].len(),
                "axis complete"
            );
        }

        let count = averages
            .iter()
            .chain(weighted.iter())
            .map(Vec::len)
            .min()
            .unwrap_or(0);

        let windows: Vec<WindowStatistics> = (0..count)
            .map(|index| WindowStatistics {
                index,
                average: [averages[0][index], averages[1][index], averages[2][index]],
                weighted: [weighted[0][index], weighted[1][index], weighted[2][index]],
            })
            .collect();

        info!(windows = windows.len(), window_size = w, "window statistics computed");
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::ascending_weighted_mean;

    /// Computes the weighted mean locally; optionally drops one response.
    struct LocalSource {
        calls: usize,
        drop_at: Option<usize>,
        max_window: usize,
    }

    impl LocalSource {
        fn new() -> Self {
            Self {
                calls: 0,
                drop_at: None,
                max_window: 1023,
            }
        }
    }

    impl WeightedMeanSource for LocalSource {
        fn max_window(&self) -> usize {
            self.max_window
        }

        fn weighted_mean(&mut self, window: &[f32]) -> Result<Option<f32>, DeviceError> {
            let call = self.calls;
            self.calls += 1;
            if self.drop_at == Some(call) {
                return Ok(None);
            }
            Ok(Some(ascending_weighted_mean(window)))
        }
    }

    fn ramp(len: usize) -> Vec<SampleRecord> {
        (0..len)
            .map(|i| {
                let v = i as f32;
                SampleRecord::new([v, 2.0 * v, -v], Vec::new())
            })
            .collect()
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_count(12, 10), 3);
        assert_eq!(window_count(10, 10), 1);
        assert_eq!(window_count(9, 10), 0);
        assert_eq!(window_count(0, 1), 0);
        assert_eq!(window_count(5, 1), 5);
        assert_eq!(weighted_window_count(12, 10), 2);
        assert_eq!(weighted_window_count(10, 10), 0);
    }

    #[test]
    fn test_local_averages_ramp() {
        let series: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let averages = local_averages(&series, 10);

        assert_eq!(averages, vec![4.5, 5.5, 6.5]);
        assert_eq!(local_averages(&series, 13).len(), 0);
    }

    #[test]
    fn test_local_average_count_matches_formula() {
        for len in 0..20 {
            for w in 1..8 {
                let series = vec![1.0f32; len];
                assert_eq!(local_averages(&series, w).len(), window_count(len, w));
            }
        }
    }

    #[test]
    fn test_engine_aligns_all_axes() {
        let engine = SlidingWindowEngine::new(10).unwrap();
        let mut source = LocalSource::new();
        let windows = engine.compute(&ramp(12), &mut source).unwrap();

        // Three local windows but only two offloaded ones
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].average, [4.5, 9.0, -4.5]);
        assert_eq!(windows[1].average, [5.5, 11.0, -5.5]);
        assert_eq!(windows[1].mid_index(10), 6);

        // sum(k * (k-1)) / sum(k) for k = 1..=10 gives 6.0
        assert!((windows[0].weighted[0] - 6.0).abs() < 1e-5);
        assert!((windows[0].weighted[2] + 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_engine_truncates_on_dropped_response() {
        let engine = SlidingWindowEngine::new(3).unwrap();
        let mut source = LocalSource::new();
        // Axis X gets calls 0..5, so the drop lands on window 2 of X
        source.drop_at = Some(2);

        let windows = engine.compute(&ramp(8), &mut source).unwrap();
        assert_eq!(windows.len(), 2);
        // Y and Z only needed two windows each
        assert_eq!(source.calls, 3 + 2 + 2);
    }

    #[test]
    fn test_engine_insufficient_samples() {
        let engine = SlidingWindowEngine::new(10).unwrap();
        let mut source = LocalSource::new();

        assert!(engine.compute(&ramp(9), &mut source).unwrap().is_empty());
        assert!(engine.compute(&[], &mut source).unwrap().is_empty());
        assert_eq!(source.calls, 0);
    }

    #[test]
    fn test_engine_rejects_zero_window() {
        assert!(matches!(
            SlidingWindowEngine::new(0),
            Err(EngineError::InvalidWindowSize)
        ));
    }

    #[test]
    fn test_engine_window_larger_than_buffer() {
        let engine = SlidingWindowEngine::new(10).unwrap();
        let mut source = LocalSource::new();
        source.max_window = 4;

        let err = engine.compute(&ramp(20), &mut source).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Codec(CodecError::BufferOverflow { .. })
        ));
        assert_eq!(source.calls, 0);
    }
}
