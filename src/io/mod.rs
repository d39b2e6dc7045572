//! Input and output tables.

pub mod input;
pub mod output;

pub use input::{read_samples, read_samples_from_path, InputError, InputTable, RowParseError};
pub use output::{OutputError, RecordWriter};
