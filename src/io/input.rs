//! Delimited sample table reader.
//!
//! Rows are `x, y, z[, auxiliary...]` without a header. A row whose primary
//! fields do not parse (a header line, a truncated row) is skipped and
//! reported; the rest of the file is still read.

use crate::core::windowing::{SampleRecord, PRIMARY_AXES};
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Fatal input errors.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read input: {0}")]
    Read(#[from] csv::Error),
}

/// A single row that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowParseError {
    #[error("row {row}: expected at least 3 columns, found {found}")]
    TooFewColumns { row: usize, found: usize },

    #[error("row {row}, column {column}: '{value}' is not a number")]
    NotNumeric {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("row {row}: {message}")]
    Malformed { row: usize, message: String },
}

/// Parsed input.
#[derive(Debug, Clone, Default)]
pub struct InputTable {
    pub records: Vec<SampleRecord>,
    pub skipped: Vec<RowParseError>,
    /// Widest row seen, used to pick the auxiliary layout
    pub max_columns: usize,
}

impl InputTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read samples from a file.
pub fn read_samples_from_path(path: impl AsRef<Path>) -> Result<InputTable, InputError> {
    let path = path.as_ref();
    let reader = builder()
        .from_path(path)
        .map_err(|source| InputError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    read_from(reader)
}

/// Read samples from any reader.
pub fn read_samples<R: Read>(input: R) -> Result<InputTable, InputError> {
    read_from(builder().from_reader(input))
}

fn builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true).trim(Trim::All);
    builder
}

fn read_from<R: Read>(mut reader: csv::Reader<R>) -> Result<InputTable, InputError> {
    let mut table = InputTable::default();

    for (row, result) in reader.records().enumerate() {
        let row = row + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                skip(
                    &mut table,
                    RowParseError::Malformed {
                        row,
                        message: e.to_string(),
                    },
                );
                continue;
            }
        };

        // Blank lines
        if record.iter().all(str::is_empty) {
            continue;
        }

        match parse_row(row, &record) {
            Ok(sample) => {
                table.max_columns = table.max_columns.max(record.len());
                table.records.push(sample);
            }
            Err(e) => skip(&mut table, e),
        }
    }

    debug!(
        rows = table.records.len(),
        skipped = table.skipped.len(),
        "input parsed"
    );
    Ok(table)
}

fn parse_row(row: usize, record: &csv::StringRecord) -> Result<SampleRecord, RowParseError> {
    if record.len() < PRIMARY_AXES {
        return Err(RowParseError::TooFewColumns {
            row,
            found: record.len(),
        });
    }

    let mut primary = [0.0f32; PRIMARY_AXES];
    for (column, slot) in primary.iter_mut().enumerate() {
        let field = &record[column];
        *slot = field.parse().map_err(|_| RowParseError::NotNumeric {
            row,
            column,
            value: field.to_string(),
        })?;
    }

    let auxiliary = record
        .iter()
        .skip(PRIMARY_AXES)
        .map(str::to_string)
        .collect();
    Ok(SampleRecord::new(primary, auxiliary))
}

fn skip(table: &mut InputTable, error: RowParseError) {
    warn!("skipping input {error}");
    table.skipped.push(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::Axis;

    #[test]
    fn test_read_minimal_rows() {
        let table = read_samples("0,1,2\n3.5, 4 ,-5\n".as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.max_columns, 3);
        assert_eq!(table.records[1].primary(Axis::X), 3.5);
        assert_eq!(table.records[1].primary(Axis::Y), 4.0);
        assert_eq!(table.records[1].primary(Axis::Z), -5.0);
        assert!(table.records[0].auxiliary().is_empty());
    }

    #[test]
    fn test_header_and_bad_rows_skipped() {
        let data = "ax,ay,az,gx\n1,2,3,4\n1,2\n1,oops,3\n\n7,8,9,x\n";
        let table = read_samples(data.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped.len(), 3);
        assert_eq!(
            table.skipped[1],
            RowParseError::TooFewColumns { row: 3, found: 2 }
        );
        assert!(matches!(
            table.skipped[2],
            RowParseError::NotNumeric { row: 4, column: 1, .. }
        ));

        // Auxiliary fields are kept raw, even when not numeric
        assert_eq!(table.records[1].auxiliary(), &["x".to_string()]);
        assert_eq!(table.max_columns, 4);
    }

    #[test]
    fn test_read_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imu.csv");
        std::fs::write(&path, "1,2,3,4,5,6,7,8,9\n").unwrap();

        let table = read_samples_from_path(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].width(), 9);
    }

    #[test]
    fn test_missing_file() {
        let err = read_samples_from_path("/nonexistent/imu.csv").unwrap_err();
        assert!(matches!(err, InputError::Open { .. }));
    }
}
