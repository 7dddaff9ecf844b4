//! Delimited-text writer

use std::io::Write;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tabconv_core::Value;

use crate::csv_error::CsvError;
use crate::format::{CsvSettings, QuoteMode};

/// Render a value as delimited text. `None` is SQL NULL.
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bytes(bytes) => Some(BASE64.encode(bytes)),
        other => Some(other.to_string()),
    }
}

/// Numbers and booleans stay unquoted under `QuoteStrings`
fn is_plain(value: &Value) -> bool {
    value.is_numeric() || matches!(value, Value::Bool(_))
}

/// Streaming delimited-text writer
pub struct CsvWriter<W: Write> {
    out: W,
    settings: CsvSettings,
    column_count: Option<usize>,
    rows_written: u64,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W, settings: CsvSettings) -> Self {
        Self {
            out,
            settings,
            column_count: None,
            rows_written: 0,
        }
    }

    pub fn settings(&self) -> &CsvSettings {
        &self.settings
    }

    /// Rows written so far, header included
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn write_header<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), CsvError> {
        let values: Vec<Value> = names
            .iter()
            .map(|n| Value::String(n.as_ref().to_string()))
            .collect();
        self.write_row(&values)
    }

    pub fn write_row(&mut self, values: &[Value]) -> Result<(), CsvError> {
        let fields = values
            .iter()
            .map(|v| {
                let text = render_value(v);
                format_field(&self.settings, text.as_deref(), is_plain(v))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.write_fields(&fields)
    }

    /// Write a row of already-rendered text fields
    pub fn write_text_row(&mut self, fields: &[Option<String>]) -> Result<(), CsvError> {
        let fields = fields
            .iter()
            .map(|f| format_field(&self.settings, f.as_deref(), false))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_fields(&fields)
    }

    fn write_fields(&mut self, fields: &[String]) -> Result<(), CsvError> {
        self.check_column_count(fields.len())?;
        let mut sep = [0u8; 4];
        let sep = self.settings.separator().encode_utf8(&mut sep);
        for (idx, field) in fields.iter().enumerate() {
            if idx > 0 {
                self.out.write_all(sep.as_bytes())?;
            }
            self.out.write_all(field.as_bytes())?;
        }
        self.out
            .write_all(self.settings.line_break().as_str().as_bytes())?;
        self.rows_written += 1;
        Ok(())
    }

    fn check_column_count(&mut self, actual: usize) -> Result<(), CsvError> {
        match self.column_count {
            None => {
                self.column_count = Some(actual);
                Ok(())
            }
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(CsvError::ColumnCount { expected, actual }),
        }
    }

    pub fn flush(&mut self) -> Result<(), CsvError> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W, CsvError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Apply the quote mode to one field.
///
/// `plain` marks numeric/boolean values, which `QuoteStrings` leaves bare.
pub(crate) fn format_field(
    settings: &CsvSettings,
    text: Option<&str>,
    plain: bool,
) -> Result<String, CsvError> {
    let Some(text) = text else {
        return Ok(settings.null_text().to_string());
    };
    let needed = settings.needs_quoting(text)
        || (!settings.null_text().is_empty() && text == settings.null_text());
    let quote = match settings.quote_mode() {
        QuoteMode::NoQuote => {
            if needed {
                return Err(CsvError::QuotingRequired {
                    value: text.to_string(),
                });
            }
            false
        }
        QuoteMode::QuoteIfNeeded => needed,
        QuoteMode::QuoteStrings => needed || !plain,
        QuoteMode::QuoteAll => true,
    };
    Ok(if quote {
        quote_text(settings, text)
    } else {
        text.to_string()
    })
}

pub(crate) fn quote_text(settings: &CsvSettings, text: &str) -> String {
    let q = settings.quote_char();
    let escape = settings.quote_escape_char();
    let mut out = String::with_capacity(text.len() + 2);
    out.push(q);
    for c in text.chars() {
        if c == q || (c == escape && !settings.escape_is_quote()) {
            out.push(escape);
        }
        out.push(c);
    }
    out.push(q);
    out
}
