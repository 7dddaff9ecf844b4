//! Errors raised by the delimited-text reader and writer

use thiserror::Error;

use crate::format::SettingsError;

/// Errors while reading or writing delimited text
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Data error at line {line}: {message}")]
    Data { line: usize, message: String },

    #[error("Illegal reader state: {0}")]
    IllegalState(&'static str),

    #[error("Value requires quoting but quoting is disabled: {value:?}")]
    QuotingRequired { value: String },

    #[error("Row has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
}

impl CsvError {
    pub(crate) fn data(line: usize, message: impl Into<String>) -> Self {
        CsvError::Data {
            line,
            message: message.into(),
        }
    }

    /// Line number for data errors
    pub fn line(&self) -> Option<usize> {
        match self {
            CsvError::Data { line, .. } => Some(*line),
            _ => None,
        }
    }
}
