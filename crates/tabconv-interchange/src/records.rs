//! Record source and sink capabilities
//!
//! A `RecordSource` yields flat field-name -> value records in a forward-only
//! pass; a `RecordSink` is its dual on the export side. The delimited-text
//! adapters live here, the JSON ones in `json_records`.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use indexmap::IndexMap;
use tabconv_core::{ColumnMeta, Value};
use thiserror::Error;

use crate::beautify::BeautifyingCsvWriter;
use crate::csv_error::CsvError;
use crate::csv_reader::{CsvReader, CsvRow};
use crate::csv_writer::CsvWriter;
use crate::format::CsvSettings;

/// One record; `None` is a null value
pub type Record = IndexMap<String, Option<String>>;

/// Errors raised by record sources and sinks
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Csv(#[from] CsvError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document: {0}")]
    MalformedRoot(String),

    #[error("Record sink used out of order: {0}")]
    IllegalState(&'static str),
}

/// Forward-only source of records
pub trait RecordSource {
    /// Field names available in every record
    fn field_names(&self) -> &[String];

    /// Next record, or `None` once the source is exhausted
    fn read_record(&mut self) -> Result<Option<Record>, RecordError>;

    fn close(&mut self) -> Result<(), RecordError> {
        Ok(())
    }
}

/// Destination for exported rows
pub trait RecordSink {
    /// Start the collection; called once before any record
    fn begin(&mut self, columns: &[ColumnMeta]) -> Result<(), RecordError>;

    fn write_record(&mut self, values: &[Value]) -> Result<(), RecordError>;

    /// End the collection and flush. The sink must not be used afterwards.
    fn finish(&mut self) -> Result<(), RecordError>;
}

/// Delimited-text record source
pub struct CsvRecordSource<R> {
    reader: CsvReader<R>,
    names: Vec<String>,
    pending: Option<CsvRow>,
}

impl<R: BufRead> CsvRecordSource<R> {
    /// With `has_headers` the first row names the fields, otherwise fields
    /// are named `column_1..column_n` after the first row's width.
    pub fn new(input: R, settings: CsvSettings, has_headers: bool) -> Result<Self, RecordError> {
        let mut reader = CsvReader::new(input, settings);
        let first = reader.read_next_row()?;

        let (names, pending) = match first {
            Some(header) if has_headers => {
                let names = header
                    .into_iter()
                    .enumerate()
                    .map(|(idx, name)| match name {
                        Some(name) if !name.trim().is_empty() => name,
                        _ => generated_name(idx),
                    })
                    .collect();
                (names, None)
            }
            Some(row) => ((0..row.len()).map(generated_name).collect(), Some(row)),
            None => (Vec::new(), None),
        };

        Ok(Self {
            reader,
            names,
            pending,
        })
    }
}

impl CsvRecordSource<BufReader<File>> {
    pub fn open(
        path: impl AsRef<Path>,
        settings: CsvSettings,
        has_headers: bool,
    ) -> Result<Self, RecordError> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file), settings, has_headers)
    }
}

fn generated_name(idx: usize) -> String {
    format!("column_{}", idx + 1)
}

impl<R: BufRead> RecordSource for CsvRecordSource<R> {
    fn field_names(&self) -> &[String] {
        &self.names
    }

    fn read_record(&mut self) -> Result<Option<Record>, RecordError> {
        let row = match self.pending.take() {
            Some(row) => Some(row),
            None => self.reader.read_next_row()?,
        };
        Ok(row.map(|fields| self.names.iter().cloned().zip(fields).collect()))
    }
}

enum CsvSinkWriter<W: Write> {
    Plain(CsvWriter<W>),
    Beautified(BeautifyingCsvWriter<W>),
    Finished,
}

/// Delimited-text record sink, optionally beautified
pub struct CsvRecordSink<W: Write> {
    writer: CsvSinkWriter<W>,
    write_header: bool,
}

impl<W: Write> CsvRecordSink<W> {
    pub fn new(out: W, settings: CsvSettings, write_header: bool) -> Self {
        Self {
            writer: CsvSinkWriter::Plain(CsvWriter::new(out, settings)),
            write_header,
        }
    }

    /// Sink that aligns columns through a temporary spool file
    pub fn beautified(
        out: W,
        settings: CsvSettings,
        write_header: bool,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            writer: CsvSinkWriter::Beautified(BeautifyingCsvWriter::new(out, settings)?),
            write_header,
        })
    }
}

impl<W: Write> RecordSink for CsvRecordSink<W> {
    fn begin(&mut self, columns: &[ColumnMeta]) -> Result<(), RecordError> {
        if !self.write_header {
            return Ok(());
        }
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        match &mut self.writer {
            CsvSinkWriter::Plain(w) => w.write_header(&names)?,
            CsvSinkWriter::Beautified(w) => w.write_header(&names)?,
            CsvSinkWriter::Finished => return Err(RecordError::IllegalState("begin after finish")),
        }
        Ok(())
    }

    fn write_record(&mut self, values: &[Value]) -> Result<(), RecordError> {
        match &mut self.writer {
            CsvSinkWriter::Plain(w) => w.write_row(values)?,
            CsvSinkWriter::Beautified(w) => w.write_row(values)?,
            CsvSinkWriter::Finished => {
                return Err(RecordError::IllegalState("write after finish"));
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        match std::mem::replace(&mut self.writer, CsvSinkWriter::Finished) {
            CsvSinkWriter::Plain(mut w) => w.flush()?,
            CsvSinkWriter::Beautified(w) => {
                w.finish()?;
            }
            CsvSinkWriter::Finished => {}
        }
        Ok(())
    }
}

/// Field names plus the first few records of a source
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPreview {
    pub field_names: Vec<String>,
    pub records: Vec<Record>,
}

/// Read at most `max_rows` records for display
pub fn preview_records(
    source: &mut dyn RecordSource,
    max_rows: usize,
) -> Result<RecordPreview, RecordError> {
    let mut records = Vec::new();
    while records.len() < max_rows {
        match source.read_record()? {
            Some(record) => records.push(record),
            None => break,
        }
    }
    Ok(RecordPreview {
        field_names: source.field_names().to_vec(),
        records,
    })
}
