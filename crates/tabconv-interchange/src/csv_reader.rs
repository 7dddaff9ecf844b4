//! Delimited-text reader
//!
//! A pull parser over any `BufRead`. Each call to `read_next_row` consumes
//! characters until a row terminator outside a quoted field and returns the
//! row's fields. The parser is a two-state machine (outside a field /
//! inside a quoted field) driven by a single mutable `ParseCursor`.

use std::io::BufRead;

use crate::csv_error::CsvError;
use crate::format::CsvSettings;

/// One parsed row; `None` is a null field
pub type CsvRow = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    Fresh,
    Single,
    Bulk,
}

/// Mutable parse state for the row being assembled
#[derive(Debug, Default)]
struct ParseCursor {
    /// Raw text of the current field, quotes included
    field: String,
    fields: CsvRow,
    in_quotes: bool,
    field_quoted: bool,
    /// The previous character was a distinct escape char inside quotes
    escaped: bool,
    prev: Option<char>,
    /// A `\r` terminated the last row; swallow a directly following `\n`
    pending_lf: bool,
}

impl ParseCursor {
    fn row_is_empty(&self) -> bool {
        self.fields.is_empty() && self.field.is_empty() && !self.field_quoted
    }
}

/// Stateful, forward-only delimited-text reader
pub struct CsvReader<R> {
    input: R,
    settings: CsvSettings,
    buf: String,
    pos: usize,
    cursor: ParseCursor,
    column_count: Option<usize>,
    line: usize,
    mode: ReadMode,
    eof: bool,
}

impl<R: BufRead> CsvReader<R> {
    pub fn new(input: R, settings: CsvSettings) -> Self {
        Self {
            input,
            settings,
            buf: String::new(),
            pos: 0,
            cursor: ParseCursor::default(),
            column_count: None,
            line: 1,
            mode: ReadMode::Fresh,
            eof: false,
        }
    }

    pub fn settings(&self) -> &CsvSettings {
        &self.settings
    }

    /// Canonical column count, fixed by the first row
    pub fn column_count(&self) -> Option<usize> {
        self.column_count
    }

    /// Current (1-based) line number of the input
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Read the next row, or `None` at end of input.
    pub fn read_next_row(&mut self) -> Result<Option<CsvRow>, CsvError> {
        if self.mode == ReadMode::Bulk {
            return Err(CsvError::IllegalState(
                "single-row read after a bulk read on the same reader",
            ));
        }
        self.mode = ReadMode::Single;
        self.read_row()
    }

    /// Read every remaining row. Not allowed once `read_next_row` was used.
    pub fn read_all(&mut self) -> Result<Vec<CsvRow>, CsvError> {
        self.enter_bulk()?;
        let mut rows = Vec::new();
        while let Some(row) = self.read_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Count the remaining rows. Not allowed once `read_next_row` was used.
    pub fn count_rows(&mut self) -> Result<u64, CsvError> {
        self.enter_bulk()?;
        let mut count = 0;
        while self.read_row()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    fn enter_bulk(&mut self) -> Result<(), CsvError> {
        if self.mode == ReadMode::Single {
            return Err(CsvError::IllegalState(
                "bulk read after single-row reads on the same reader",
            ));
        }
        self.mode = ReadMode::Bulk;
        Ok(())
    }

    fn next_char(&mut self) -> Result<Option<char>, CsvError> {
        if self.pos >= self.buf.len() {
            self.buf.clear();
            self.pos = 0;
            if self.input.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
        }
        let c = self.buf[self.pos..].chars().next();
        if let Some(c) = c {
            self.pos += c.len_utf8();
        }
        Ok(c)
    }

    fn read_row(&mut self) -> Result<Option<CsvRow>, CsvError> {
        if self.eof {
            return Ok(None);
        }
        let separator = self.settings.separator();
        let quote = self.settings.quote_char();
        let quoting = self.settings.quoting_enabled();

        loop {
            let Some(c) = self.next_char()? else {
                return self.finish_at_eof();
            };

            if self.cursor.pending_lf {
                self.cursor.pending_lf = false;
                if c == '\n' {
                    continue;
                }
            }

            if self.cursor.in_quotes {
                self.consume_quoted(c, quote)?;
                continue;
            }

            if c == separator {
                self.end_field()?;
            } else if c == '\n' || c == '\r' {
                let row_line = self.line;
                if c == '\r' {
                    self.cursor.pending_lf = true;
                }
                if self.cursor.row_is_empty() {
                    self.line += 1;
                    if self.settings.ignore_empty_lines() {
                        continue;
                    }
                    return self.finish_row(vec![None], row_line).map(Some);
                }
                self.end_field()?;
                self.line += 1;
                let fields = std::mem::take(&mut self.cursor.fields);
                return self.finish_row(fields, row_line).map(Some);
            } else if quoting && c == quote {
                self.cursor.in_quotes = true;
                self.cursor.field_quoted = true;
                self.cursor.field.push(c);
                self.cursor.prev = Some(c);
            } else {
                self.cursor.field.push(c);
                self.cursor.prev = Some(c);
            }
        }
    }

    fn consume_quoted(&mut self, c: char, quote: char) -> Result<(), CsvError> {
        let escape = self.settings.quote_escape_char();
        if self.cursor.escaped {
            self.cursor.escaped = false;
        } else if c == quote {
            // With doubled-quote escaping every quote toggles; the pairs are
            // collapsed when the field is finished.
            self.cursor.in_quotes = false;
        } else if c == escape && !self.settings.escape_is_quote() {
            self.cursor.escaped = true;
        }
        if c == '\n' || c == '\r' {
            if !self.settings.line_break_in_data_allowed() {
                return Err(CsvError::data(
                    self.line,
                    "line break inside a quoted field is not allowed",
                ));
            }
            if c == '\r' || self.cursor.prev != Some('\r') {
                self.line += 1;
            }
        }
        self.cursor.field.push(c);
        self.cursor.prev = Some(c);
        Ok(())
    }

    fn finish_at_eof(&mut self) -> Result<Option<CsvRow>, CsvError> {
        self.eof = true;
        if self.cursor.in_quotes {
            return Err(CsvError::data(self.line, "unterminated quoted field"));
        }
        if self.cursor.row_is_empty() {
            return Ok(None);
        }
        self.end_field()?;
        let fields = std::mem::take(&mut self.cursor.fields);
        let line = self.line;
        self.finish_row(fields, line).map(Some)
    }

    fn end_field(&mut self) -> Result<(), CsvError> {
        let raw = std::mem::take(&mut self.cursor.field);
        let quoted = std::mem::replace(&mut self.cursor.field_quoted, false);
        self.cursor.prev = None;
        let value = self.finish_field(raw, quoted)?;
        self.cursor.fields.push(value);
        Ok(())
    }

    fn finish_field(&self, raw: String, quoted: bool) -> Result<Option<String>, CsvError> {
        let quote = self.settings.quote_char();
        let q_len = quote.len_utf8();
        let wrapped = quoted
            && raw.len() >= 2 * q_len
            && raw.starts_with(quote)
            && raw.ends_with(quote);

        let mut text = if wrapped {
            let inner = &raw[q_len..raw.len() - q_len];
            if self.settings.escape_is_quote() {
                let doubled: String = [quote, quote].iter().collect();
                inner.replace(&doubled, &quote.to_string())
            } else {
                unescape(inner, self.settings.quote_escape_char(), quote)
            }
        } else {
            if quoted && !self.settings.escaped_quote_in_data_allowed() {
                return Err(CsvError::data(
                    self.line,
                    format!("unexpected quote character in unquoted field {:?}", raw),
                ));
            }
            raw
        };

        if text.contains('\r') {
            text = text.replace("\r\n", "\n").replace('\r', "\n");
        }
        if self.settings.always_trim() {
            text = text.trim().to_string();
        }

        if !wrapped
            && (text.is_empty()
                || (!self.settings.null_text().is_empty() && text == self.settings.null_text()))
        {
            return Ok(None);
        }
        Ok(Some(text))
    }

    fn finish_row(&mut self, mut fields: CsvRow, line: usize) -> Result<CsvRow, CsvError> {
        let expected = match self.column_count {
            None => {
                self.column_count = Some(fields.len());
                return Ok(fields);
            }
            Some(expected) => expected,
        };

        if fields.len() < expected && self.settings.fill_missing_trailing_columns_with_null() {
            fields.resize(expected, None);
        } else if fields.len() > expected
            && self.settings.remove_surplus_empty_trailing_columns()
            && fields[expected..].iter().all(Option::is_none)
        {
            fields.truncate(expected);
        }

        if fields.len() != expected {
            return Err(CsvError::data(
                line,
                format!("row has {} columns, expected {}", fields.len(), expected),
            ));
        }
        Ok(fields)
    }
}

/// Collapse `<esc><quote>` and `<esc><esc>`; any other escape stays as is
fn unescape(inner: &str, escape: char, quote: char) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == escape {
            if let Some(&next) = chars.peek() {
                if next == escape || next == quote {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
