//! Two-pass column alignment for delimited output
//!
//! Pass 1 spools every row to a temporary file and measures each column.
//! `finish` re-reads the spool and writes every field padded to its column
//! width: numeric columns are left-padded, all others right-padded.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use tabconv_core::Value;
use tempfile::NamedTempFile;

use crate::csv_error::CsvError;
use crate::csv_reader::CsvReader;
use crate::csv_writer::{CsvWriter, format_field, render_value};
use crate::format::{CsvSettings, QuoteMode};

#[derive(Debug, Clone, Default)]
struct ColumnWidth {
    /// Widest field when the column is rendered as numeric
    as_numeric: usize,
    /// Widest field when the column is rendered as text
    as_text: usize,
    numeric: bool,
}

impl ColumnWidth {
    fn width(&self) -> usize {
        if self.numeric {
            self.as_numeric
        } else {
            self.as_text
        }
    }
}

/// Delimited writer that aligns columns on `finish`
pub struct BeautifyingCsvWriter<W: Write> {
    out: W,
    settings: CsvSettings,
    spool: CsvWriter<BufWriter<NamedTempFile>>,
    widths: Vec<ColumnWidth>,
}

impl<W: Write> BeautifyingCsvWriter<W> {
    pub fn new(out: W, settings: CsvSettings) -> Result<Self, CsvError> {
        let temp = NamedTempFile::new()?;
        tracing::debug!(path = %temp.path().display(), "beautifier spool created");
        Ok(Self {
            out,
            settings,
            spool: CsvWriter::new(BufWriter::new(temp), spool_settings()?),
            widths: Vec::new(),
        })
    }

    /// Header fields count toward widths but never mark a column numeric
    pub fn write_header<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), CsvError> {
        let values: Vec<Value> = names
            .iter()
            .map(|n| Value::String(n.as_ref().to_string()))
            .collect();
        self.write_row(&values)
    }

    pub fn write_row(&mut self, values: &[Value]) -> Result<(), CsvError> {
        if self.widths.is_empty() {
            self.widths = vec![ColumnWidth::default(); values.len()];
        }
        let texts: Vec<Option<String>> = values.iter().map(render_value).collect();
        // The spool enforces the column count before widths are touched.
        self.spool.write_text_row(&texts)?;

        // Under `QuoteStrings` the column's numeric flag decides quoting, so
        // both renderings are measured.
        for ((width, value), text) in self.widths.iter_mut().zip(values).zip(&texts) {
            let text = text.as_deref();
            width.as_numeric = width
                .as_numeric
                .max(format_field(&self.settings, text, true)?.chars().count());
            width.as_text = width
                .as_text
                .max(format_field(&self.settings, text, false)?.chars().count());
            if value.is_numeric() {
                width.numeric = true;
            }
        }
        Ok(())
    }

    /// Run pass 2 into the real output and return it
    pub fn finish(self) -> Result<W, CsvError> {
        let Self {
            mut out,
            settings,
            spool,
            widths,
        } = self;

        let temp = spool
            .into_inner()?
            .into_inner()
            .map_err(|e| CsvError::Io(e.into_error()))?;
        let file: File = temp.reopen()?;
        let mut reader = CsvReader::new(BufReader::new(file), spool_settings()?);
        let mut sep = [0u8; 4];
        let sep = settings.separator().encode_utf8(&mut sep);
        while let Some(row) = reader.read_next_row()? {
            for (idx, (field, width)) in row.iter().zip(&widths).enumerate() {
                if idx > 0 {
                    out.write_all(sep.as_bytes())?;
                }
                let text = format_field(&settings, field.as_deref(), width.numeric)?;
                let pad = " ".repeat(width.width().saturating_sub(text.chars().count()));
                if width.numeric {
                    out.write_all(pad.as_bytes())?;
                    out.write_all(text.as_bytes())?;
                } else {
                    out.write_all(text.as_bytes())?;
                    out.write_all(pad.as_bytes())?;
                }
            }
            out.write_all(settings.line_break().as_str().as_bytes())?;
        }
        out.flush()?;
        drop(temp);
        tracing::debug!("beautifier spool removed");
        Ok(out)
    }
}

/// Lossless spool format: every non-null value quoted so empty strings survive
fn spool_settings() -> Result<CsvSettings, CsvError> {
    Ok(CsvSettings::builder()
        .quote_mode(QuoteMode::QuoteAll)
        .ignore_empty_lines(false)
        .build()?)
}
