//! Output table writer.
//!
//! File output goes to a sibling `*.partial` file that is renamed into
//! place by [`RecordWriter::finish`]. A writer dropped without finishing,
//! or whose finish fails, removes the partial file, so an aborted run never
//! leaves a truncated table behind. Stdout output is held in memory and
//! only printed by a successful finish.

use crate::core::assembler::{output_header, AuxiliaryLayout, OutputRecord};
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to write record: {0}")]
    Csv(#[from] csv::Error),

    #[error("record has {found} fields but the header has {expected}")]
    Width { expected: usize, found: usize },
}

enum Sink {
    File {
        writer: Writer<File>,
        partial: PathBuf,
        target: PathBuf,
    },
    Stdout(Writer<Vec<u8>>),
    Memory(Writer<Vec<u8>>),
}

/// Writes the header and one row per [`OutputRecord`].
pub struct RecordWriter {
    sink: Option<Sink>,
    columns: usize,
    written: usize,
}

impl RecordWriter {
    /// Write to `target` once [`finish`](Self::finish) is called.
    pub fn to_path(target: impl AsRef<Path>, layout: &AuxiliaryLayout) -> Result<Self, OutputError> {
        let target = target.as_ref().to_path_buf();
        let partial = partial_path(&target);
        let file = File::create(&partial)?;
        debug!(path = %partial.display(), "writing output");

        Self::with_sink(
            Sink::File {
                writer: builder().from_writer(file),
                partial,
                target,
            },
            layout,
        )
    }

    /// Print the table to stdout once [`finish`](Self::finish) is called.
    pub fn to_stdout(layout: &AuxiliaryLayout) -> Result<Self, OutputError> {
        Self::with_sink(Sink::Stdout(builder().from_writer(Vec::new())), layout)
    }

    /// Buffer the table in memory; retrieve it with [`finish_to_string`](Self::finish_to_string).
    pub fn in_memory(layout: &AuxiliaryLayout) -> Result<Self, OutputError> {
        Self::with_sink(Sink::Memory(builder().from_writer(Vec::new())), layout)
    }

    fn with_sink(sink: Sink, layout: &AuxiliaryLayout) -> Result<Self, OutputError> {
        let header = output_header(layout);
        let mut writer = Self {
            sink: Some(sink),
            columns: header.len(),
            written: 0,
        };
        writer.write_row(&header)?;
        Ok(writer)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, record: &OutputRecord) -> Result<(), OutputError> {
        let fields = record.fields();
        if fields.len() != self.columns {
            return Err(OutputError::Width {
                expected: self.columns,
                found: fields.len(),
            });
        }
        self.write_row(&fields)?;
        self.written += 1;
        Ok(())
    }

    /// Flush and move the output into place.
    pub fn finish(mut self) -> Result<(), OutputError> {
        match self.sink.take() {
            Some(Sink::File {
                writer,
                partial,
                target,
            }) => {
                if let Err(e) = commit(writer, &partial, &target) {
                    remove_partial(&partial);
                    return Err(e);
                }
                debug!(path = %target.display(), rows = self.written, "output complete");
            }
            Some(Sink::Stdout(writer)) => {
                let bytes = writer.into_inner().map_err(|e| e.into_error())?;
                let mut stdout = io::stdout().lock();
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            Some(Sink::Memory(mut writer)) => writer.flush()?,
            None => {}
        }
        Ok(())
    }

    /// Flush an in-memory writer and return the table text.
    pub fn finish_to_string(mut self) -> Result<String, OutputError> {
        match self.sink.take() {
            Some(Sink::Memory(writer)) => {
                let bytes = writer.into_inner().map_err(|e| e.into_error())?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            other => {
                self.sink = other;
                self.finish()?;
                Ok(String::new())
            }
        }
    }

    fn write_row<I, T>(&mut self, fields: I) -> Result<(), OutputError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        match self.sink.as_mut() {
            Some(Sink::File { writer, .. }) => writer.write_record(fields)?,
            Some(Sink::Stdout(writer)) => writer.write_record(fields)?,
            Some(Sink::Memory(writer)) => writer.write_record(fields)?,
            None => {}
        }
        Ok(())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if let Some(Sink::File { writer, partial, .. }) = self.sink.take() {
            drop(writer);
            remove_partial(&partial);
        }
    }
}

fn commit(writer: Writer<File>, partial: &Path, target: &Path) -> Result<(), OutputError> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    std::fs::rename(partial, target)?;
    Ok(())
}

fn remove_partial(partial: &Path) {
    if let Err(e) = std::fs::remove_file(partial) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %partial.display(), "could not remove partial output: {e}");
        }
    }
}

fn builder() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder.has_headers(false);
    builder
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output.csv".into());
    name.push(".partial");
    target.with_file_name(name)
}
