//! Merges window statistics with the auxiliary channels of the input.
//!
//! Each window picks its auxiliary values from the sample at its midpoint
//! (`start + window_size / 2`). Windows whose midpoint lies outside the
//! input, or whose auxiliary fields do not parse, are skipped with a
//! warning.

use crate::core::windowing::{SampleRecord, WindowStatistics, PRIMARY_AXES};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Output columns for the windowed statistics.
pub const STATISTIC_COLUMNS: [&str; 2 * PRIMARY_AXES] = [
    "averaged_x",
    "averaged_y",
    "averaged_z",
    "weighted_mean_x",
    "weighted_mean_y",
    "weighted_mean_z",
];

/// Auxiliary column names used for 9-column IMU input.
pub const DEFAULT_AUXILIARY_COLUMNS: [&str; 6] =
    ["gyro_x", "gyro_y", "gyro_z", "mag_x", "mag_y", "mag_z"];

/// Auxiliary channels carried into the output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryLayout {
    pub names: Vec<String>,
}

impl AuxiliaryLayout {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// No auxiliary channels.
    pub fn none() -> Self {
        Self::default()
    }

    /// Pick a layout from the input width: two auxiliary triples for 9+
    /// columns, none otherwise.
    pub fn detect(columns: usize) -> Self {
        if columns >= PRIMARY_AXES + DEFAULT_AUXILIARY_COLUMNS.len() {
            Self::new(DEFAULT_AUXILIARY_COLUMNS.iter().map(|s| s.to_string()).collect())
        } else {
            Self::none()
        }
    }

    /// Parse a comma-separated list of column names.
    pub fn from_csv(s: &str) -> Self {
        Self::new(
            s.split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Header row for the output table.
pub fn output_header(layout: &AuxiliaryLayout) -> Vec<String> {
    STATISTIC_COLUMNS
        .iter()
        .map(|s| s.to_string())
        .chain(layout.names.iter().cloned())
        .collect()
}

/// One assembled output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub index: usize,
    pub average: [f32; PRIMARY_AXES],
    pub weighted: [f32; PRIMARY_AXES],
    pub auxiliary: Vec<f32>,
}

impl OutputRecord {
    /// Values in header order.
    pub fn fields(&self) -> Vec<String> {
        self.average
            .iter()
            .chain(self.weighted.iter())
            .chain(self.auxiliary.iter())
            .map(|v| v.to_string())
            .collect()
    }
}

/// Builds [`OutputRecord`]s from window statistics.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    window_size: usize,
    layout: AuxiliaryLayout,
}

impl ResultAssembler {
    pub fn new(window_size: usize, layout: AuxiliaryLayout) -> Self {
        Self {
            window_size,
            layout,
        }
    }

    pub fn layout(&self) -> &AuxiliaryLayout {
        &self.layout
    }

    /// Lazily assemble records in window order. Clone the iterator to restart.
    pub fn assemble<'a>(
        &'a self,
        windows: &'a [WindowStatistics],
        samples: &'a [SampleRecord],
    ) -> OutputRecords<'a> {
        OutputRecords {
            assembler: self,
            windows: windows.iter(),
            samples,
            skipped: 0,
        }
    }

    fn build(&self, window: &WindowStatistics, samples: &[SampleRecord]) -> Option<OutputRecord> {
        let mid = window.mid_index(self.window_size);
        let Some(sample) = samples.get(mid) else {
            warn!(
                window = window.index,
                mid,
                samples = samples.len(),
                "window midpoint beyond input, skipping"
            );
            return None;
        };

        let raw = sample.auxiliary();
        let mut auxiliary = Vec::with_capacity(self.layout.len());
        for (column, name) in self.layout.names.iter().enumerate() {
            match raw.get(column).map(|field| field.trim().parse::<f32>()) {
                Some(Ok(value)) => auxiliary.push(value),
                Some(Err(_)) => {
                    warn!(
                        window = window.index,
                        row = mid,
                        column = %name,
                        value = %raw[column],
                        "auxiliary field is not numeric, skipping window"
                    );
                    return None;
                }
                None => {
                    warn!(
                        window = window.index,
                        row = mid,
                        column = %name,
                        "auxiliary field missing, skipping window"
                    );
                    return None;
                }
            }
        }

        Some(OutputRecord {
            index: window.index,
            average: window.average,
            weighted: window.weighted,
            auxiliary,
        })
    }
}

/// Iterator over assembled records.
#[derive(Debug, Clone)]
pub struct OutputRecords<'a> {
    assembler: &'a ResultAssembler,
    windows: std::slice::Iter<'a, WindowStatistics>,
    samples: &'a [SampleRecord],
    skipped: usize,
}

impl OutputRecords<'_> {
    /// Windows skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for OutputRecords<'_> {
    type Item = OutputRecord;

    fn next(&mut self) -> Option<Self::Item> {
        for window in self.windows.by_ref() {
            match self.assembler.build(window, self.samples) {
                Some(record) => return Some(record),
                None => self.skipped += 1,
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.windows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(len: usize) -> Vec<SampleRecord> {
        (0..len)
            .map(|i| {
                let v = i as f32;
                SampleRecord::new(
                    [v, v, v],
                    (0..6).map(|c| format!("{}", i * 10 + c)).collect(),
                )
            })
            .collect()
    }

    fn window(index: usize) -> WindowStatistics {
        WindowStatistics {
            index,
            average: [1.0, 2.0, 3.0],
            weighted: [4.0, 5.0, 6.0],
        }
    }

    #[test]
    fn test_midpoint_lookup() {
        let assembler = ResultAssembler::new(10, AuxiliaryLayout::detect(9));
        let input = samples(12);
        let windows = vec![window(0), window(1), window(2)];

        let records: Vec<OutputRecord> = assembler.assemble(&windows, &input).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].auxiliary[0], 50.0);
        assert_eq!(records[1].auxiliary[0], 60.0);
        assert_eq!(records[2].auxiliary, vec![70.0, 71.0, 72.0, 73.0, 74.0, 75.0]);
    }

    #[test]
    fn test_midpoint_out_of_range_skipped() {
        let assembler = ResultAssembler::new(10, AuxiliaryLayout::none());
        let input = samples(7);
        let windows = vec![window(0), window(1), window(2)];

        let mut records = assembler.assemble(&windows, &input);
        let collected: Vec<_> = records.by_ref().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(records.skipped(), 1);
    }

    #[test]
    fn test_unparsable_auxiliary_skipped() {
        let mut input = samples(12);
        input[6] = SampleRecord::new(
            [0.0; 3],
            vec!["1".into(), "n/a".into(), "3".into(), "4".into(), "5".into(), "6".into()],
        );
        let assembler = ResultAssembler::new(10, AuxiliaryLayout::detect(9));
        let windows = vec![window(0), window(1), window(2)];

        let indices: Vec<usize> = assembler
            .assemble(&windows, &input)
            .map(|r| r.index)
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_assembly_is_restartable() {
        let assembler = ResultAssembler::new(4, AuxiliaryLayout::none());
        let input = samples(8);
        let windows = vec![window(0), window(1)];

        let records = assembler.assemble(&windows, &input);
        let first: Vec<_> = records.clone().collect();
        let second: Vec<_> = records.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_header_and_fields() {
        let layout = AuxiliaryLayout::from_csv("temp, , pressure");
        assert_eq!(
            output_header(&layout),
            vec![
                "averaged_x",
                "averaged_y",
                "averaged_z",
                "weighted_mean_x",
                "weighted_mean_y",
                "weighted_mean_z",
                "temp",
                "pressure"
            ]
        );

        let record = OutputRecord {
            index: 0,
            average: [4.5, 0.0, -1.0],
            weighted: [6.0, 0.0, -1.25],
            auxiliary: vec![3.0],
        };
        assert_eq!(record.fields(), vec!["4.5", "0", "-1", "6", "0", "-1.25", "3"]);
    }

    #[test]
    fn test_layout_detection() {
        assert!(AuxiliaryLayout::detect(3).is_empty());
        assert!(AuxiliaryLayout::detect(8).is_empty());
        assert_eq!(AuxiliaryLayout::detect(9).len(), 6);
    }
}
