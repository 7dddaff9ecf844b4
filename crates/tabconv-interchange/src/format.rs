//! Delimited-text format settings
//!
//! `CsvSettings` is an immutable, validated value shared by the reader, the
//! writer and the beautifier. It can only be obtained through
//! `CsvSettingsBuilder::build`, which rejects conflicting characters before
//! any stream is touched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors for delimited-text settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Separator must not be a line break character")]
    SeparatorIsLineBreak,

    #[error("Separator '{0}' conflicts with the quote character")]
    SeparatorIsQuote(char),

    #[error("Quote character must not be a line break character")]
    QuoteIsLineBreak,

    #[error("Escape character '{0}' conflicts with the separator")]
    EscapeIsSeparator(char),

    #[error("Unknown {kind} '{value}'")]
    UnknownOption { kind: &'static str, value: String },
}

/// When fields are wrapped in quote characters on write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteMode {
    /// Never quote; a value that needs quoting is a write error
    NoQuote,
    /// Quote only values containing the separator, the quote or a line break
    #[default]
    QuoteIfNeeded,
    /// Quote every non-numeric, non-boolean value
    QuoteStrings,
    /// Quote every non-null value
    QuoteAll,
}

impl QuoteMode {
    pub fn parse(s: &str) -> Result<Self, SettingsError> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "no_quote" | "none" => Ok(Self::NoQuote),
            "quote_if_needed" | "if_needed" => Ok(Self::QuoteIfNeeded),
            "quote_strings" | "strings" => Ok(Self::QuoteStrings),
            "quote_all" | "all" => Ok(Self::QuoteAll),
            _ => Err(SettingsError::UnknownOption {
                kind: "quote mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Output line terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineBreak {
    Cr,
    #[default]
    Lf,
    #[serde(rename = "crlf")]
    CrLf,
}

impl LineBreak {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineBreak::CrLf => "\r\n",
            LineBreak::Cr => "\r",
            LineBreak::Lf => "\n",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SettingsError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cr" | "\r" => Ok(Self::Cr),
            "lf" | "\n" => Ok(Self::Lf),
            "crlf" | "\r\n" => Ok(Self::CrLf),
            _ => Err(SettingsError::UnknownOption {
                kind: "line break",
                value: s.to_string(),
            }),
        }
    }
}

/// Validated delimited-text settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSettings {
    separator: char,
    quote_char: char,
    quote_escape_char: char,
    quote_mode: QuoteMode,
    line_break: LineBreak,
    line_break_in_data_allowed: bool,
    escaped_quote_in_data_allowed: bool,
    fill_missing_trailing_columns_with_null: bool,
    remove_surplus_empty_trailing_columns: bool,
    always_trim: bool,
    ignore_empty_lines: bool,
    null_text: String,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            separator: ',',
            quote_char: '"',
            quote_escape_char: '"',
            quote_mode: QuoteMode::QuoteIfNeeded,
            line_break: LineBreak::Lf,
            line_break_in_data_allowed: true,
            escaped_quote_in_data_allowed: false,
            fill_missing_trailing_columns_with_null: false,
            remove_surplus_empty_trailing_columns: false,
            always_trim: false,
            ignore_empty_lines: true,
            null_text: String::new(),
        }
    }
}

impl CsvSettings {
    pub fn builder() -> CsvSettingsBuilder {
        CsvSettingsBuilder::default()
    }

    /// Rebuild from these settings with changes applied
    pub fn to_builder(&self) -> CsvSettingsBuilder {
        CsvSettingsBuilder {
            settings: self.clone(),
            escape_set: true,
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn quote_char(&self) -> char {
        self.quote_char
    }

    pub fn quote_escape_char(&self) -> char {
        self.quote_escape_char
    }

    pub fn quote_mode(&self) -> QuoteMode {
        self.quote_mode
    }

    pub fn line_break(&self) -> LineBreak {
        self.line_break
    }

    pub fn line_break_in_data_allowed(&self) -> bool {
        self.line_break_in_data_allowed
    }

    pub fn escaped_quote_in_data_allowed(&self) -> bool {
        self.escaped_quote_in_data_allowed
    }

    pub fn fill_missing_trailing_columns_with_null(&self) -> bool {
        self.fill_missing_trailing_columns_with_null
    }

    pub fn remove_surplus_empty_trailing_columns(&self) -> bool {
        self.remove_surplus_empty_trailing_columns
    }

    pub fn always_trim(&self) -> bool {
        self.always_trim
    }

    pub fn ignore_empty_lines(&self) -> bool {
        self.ignore_empty_lines
    }

    pub fn null_text(&self) -> &str {
        &self.null_text
    }

    /// Quote characters are recognized on read only when quoting is enabled
    pub fn quoting_enabled(&self) -> bool {
        self.quote_mode != QuoteMode::NoQuote
    }

    /// Doubled-quote escaping (`""`) as opposed to a distinct escape character
    pub fn escape_is_quote(&self) -> bool {
        self.quote_escape_char == self.quote_char
    }

    /// Whether a value must be quoted to survive a round trip
    pub fn needs_quoting(&self, value: &str) -> bool {
        value.contains(self.separator)
            || value.contains(self.quote_char)
            || value.contains('\n')
            || value.contains('\r')
    }
}

/// Builder for `CsvSettings`
#[derive(Debug, Clone, Default)]
pub struct CsvSettingsBuilder {
    settings: CsvSettings,
    escape_set: bool,
}

impl CsvSettingsBuilder {
    pub fn separator(mut self, separator: char) -> Self {
        self.settings.separator = separator;
        self
    }

    /// Set the quote character. Unless an escape character was set explicitly,
    /// it follows the quote character (doubled-quote escaping).
    pub fn quote_char(mut self, quote_char: char) -> Self {
        self.settings.quote_char = quote_char;
        if !self.escape_set {
            self.settings.quote_escape_char = quote_char;
        }
        self
    }

    pub fn quote_escape_char(mut self, escape: char) -> Self {
        self.settings.quote_escape_char = escape;
        self.escape_set = true;
        self
    }

    pub fn quote_mode(mut self, mode: QuoteMode) -> Self {
        self.settings.quote_mode = mode;
        self
    }

    pub fn line_break(mut self, line_break: LineBreak) -> Self {
        self.settings.line_break = line_break;
        self
    }

    pub fn line_break_in_data_allowed(mut self, allowed: bool) -> Self {
        self.settings.line_break_in_data_allowed = allowed;
        self
    }

    pub fn escaped_quote_in_data_allowed(mut self, allowed: bool) -> Self {
        self.settings.escaped_quote_in_data_allowed = allowed;
        self
    }

    pub fn fill_missing_trailing_columns_with_null(mut self, fill: bool) -> Self {
        self.settings.fill_missing_trailing_columns_with_null = fill;
        self
    }

    pub fn remove_surplus_empty_trailing_columns(mut self, remove: bool) -> Self {
        self.settings.remove_surplus_empty_trailing_columns = remove;
        self
    }

    pub fn always_trim(mut self, trim: bool) -> Self {
        self.settings.always_trim = trim;
        self
    }

    pub fn ignore_empty_lines(mut self, ignore: bool) -> Self {
        self.settings.ignore_empty_lines = ignore;
        self
    }

    pub fn null_text(mut self, text: impl Into<String>) -> Self {
        self.settings.null_text = text.into();
        self
    }

    pub fn build(self) -> Result<CsvSettings, SettingsError> {
        let s = self.settings;
        if is_line_break(s.separator) {
            return Err(SettingsError::SeparatorIsLineBreak);
        }
        if s.quoting_enabled() {
            if s.separator == s.quote_char {
                return Err(SettingsError::SeparatorIsQuote(s.separator));
            }
            if is_line_break(s.quote_char) {
                return Err(SettingsError::QuoteIsLineBreak);
            }
            if s.quote_escape_char == s.separator {
                return Err(SettingsError::EscapeIsSeparator(s.quote_escape_char));
            }
        }
        Ok(s)
    }
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}
